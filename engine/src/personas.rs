//! Virtual subject personas
//!
//! A persona is a plain-text profile in `<number><name>.txt`, e.g.
//! `4Chen.txt`. The file stem is the subject id. Directories are scanned in
//! the order of the leading number; files without one go last, by name.

use sdk::errors::AssessmentError;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Labels of the profile line that carries the person's name
const NAME_LABELS: &[&str] = &["name", "姓名", "名字"];

#[derive(Debug, Clone, Serialize)]
pub struct Persona {
    /// File stem, used as the subject id
    pub id: String,
    pub number: Option<u32>,
    pub name: String,
    /// Full profile text
    pub description: String,
    pub path: PathBuf,
}

impl Persona {
    /// Build a persona from a stem and profile text
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        let id = id.into();
        let description = description.into();
        let (number, stem_name) = split_stem(&id);
        let name = name_from_profile(&description)
            .or(stem_name)
            .unwrap_or_else(|| id.clone());

        Self {
            id,
            number,
            name,
            description,
            path: PathBuf::new(),
        }
    }

    pub async fn load_file(path: &Path) -> Result<Self, AssessmentError> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AssessmentError::Persona(format!("Invalid persona file name: {}", path.display())))?;

        let description = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AssessmentError::Persona(format!("Failed to read {}: {}", path.display(), e)))?;
        if description.trim().is_empty() {
            return Err(AssessmentError::Persona(format!("Persona file is empty: {}", path.display())));
        }

        let mut persona = Self::new(stem, description.trim());
        persona.path = path.to_path_buf();
        debug!(id = %persona.id, name = %persona.name, "Persona loaded");
        Ok(persona)
    }

    /// Every `*.txt` persona in `dir`, ordered by leading number
    pub async fn load_dir(dir: &Path) -> Result<Vec<Self>, AssessmentError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| AssessmentError::Persona(format!("Failed to read {}: {}", dir.display(), e)))?;

        let mut personas = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AssessmentError::Persona(format!("Failed to read {}: {}", dir.display(), e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("txt") {
                personas.push(Self::load_file(&path).await?);
            }
        }

        personas.sort_by(|a, b| {
            let key = |p: &Persona| (p.number.is_none(), p.number.unwrap_or(0));
            key(a).cmp(&key(b)).then_with(|| a.id.cmp(&b.id))
        });

        info!(dir = %dir.display(), count = personas.len(), "Personas loaded");
        Ok(personas)
    }
}

/// `"4Chen"` -> `(Some(4), Some("Chen"))`
fn split_stem(stem: &str) -> (Option<u32>, Option<String>) {
    let digits: String = stem.chars().take_while(|c| c.is_ascii_digit()).collect();
    let rest = stem[digits.len()..].trim();
    (
        digits.parse().ok(),
        (!rest.is_empty()).then(|| rest.to_string()),
    )
}

/// First word after a `Name:` style label
fn name_from_profile(profile: &str) -> Option<String> {
    profile.lines().find_map(|line| {
        let lowered = line.to_lowercase();
        if !NAME_LABELS.iter().any(|label| lowered.contains(label)) {
            return None;
        }
        let (_, value) = line.split_once('：').or_else(|| line.split_once(':'))?;
        value.split_whitespace().next().map(String::from)
    })
}

/// Personas by subject id
#[derive(Debug, Clone, Default)]
pub struct PersonaBook {
    personas: HashMap<String, Persona>,
}

impl PersonaBook {
    pub fn new(personas: impl IntoIterator<Item = Persona>) -> Self {
        Self {
            personas: personas.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    pub fn get(&self, subject_id: &str) -> Option<&Persona> {
        self.personas.get(subject_id)
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_stem() {
        assert_eq!(split_stem("4Chen"), (Some(4), Some("Chen".to_string())));
        assert_eq!(split_stem("12"), (Some(12), None));
        assert_eq!(split_stem("anon"), (None, Some("anon".to_string())));
    }

    #[test]
    fn test_name_prefers_profile_line() {
        let persona = Persona::new("1Zhang", "Age: 34\n姓名：张伟 工程师\nLikes chess");
        assert_eq!(persona.name, "张伟");
        assert_eq!(persona.number, Some(1));

        let persona = Persona::new("2Li", "Quiet, careful reader");
        assert_eq!(persona.name, "Li");
    }

    #[tokio::test]
    async fn test_load_dir_orders_by_number() {
        let temp_dir = TempDir::new().unwrap();
        for (file, body) in [
            ("10Wang.txt", "Name: Wang"),
            ("2Li.txt", "Name: Li"),
            ("zed.txt", "Name: Zed"),
            ("1Zhang.txt", "Name: Zhang"),
            ("notes.md", "ignored"),
        ] {
            tokio::fs::write(temp_dir.path().join(file), body).await.unwrap();
        }

        let personas = Persona::load_dir(temp_dir.path()).await.unwrap();
        let ids: Vec<&str> = personas.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1Zhang", "2Li", "10Wang", "zed"]);

        let book = PersonaBook::new(personas);
        assert_eq!(book.len(), 4);
        assert_eq!(book.get("2Li").map(|p| p.name.as_str()), Some("Li"));
    }

    #[tokio::test]
    async fn test_empty_persona_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("3Empty.txt");
        tokio::fs::write(&path, "   \n").await.unwrap();

        assert!(matches!(
            Persona::load_file(&path).await,
            Err(AssessmentError::Persona(_))
        ));
    }
}
