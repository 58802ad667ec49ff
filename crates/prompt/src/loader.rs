//! Reads prompt overrides from `<prompts_dir>/<id>.yml`.

use std::io::ErrorKind;
use std::path::Path;

use crate::types::PromptDefinition;
use docent_core::{AppError, AppResult};

const PROMPT_EXTENSION: &str = "yml";

/// Load and check the override for `prompt_id`.
///
/// The file must exist, parse as a [`PromptDefinition`], declare the same id
/// as its file name and carry a non-blank title and template.
///
/// ```no_run
/// use docent_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let answer = load_prompt(Path::new(".docent/prompts"), "rag.answer")?;
/// println!("{}", answer.template);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(prompts_dir: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let path = prompts_dir.join(format!("{}.{}", prompt_id, PROMPT_EXTENSION));

    let raw = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => AppError::Prompt(format!("No prompt override at {}", path.display())),
        _ => AppError::Prompt(format!("Cannot read {}: {}", path.display(), e)),
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&raw)
        .map_err(|e| AppError::Prompt(format!("Invalid prompt YAML in {}: {}", path.display(), e)))?;

    check_definition(&definition, prompt_id)?;
    tracing::debug!(id = %definition.id, path = %path.display(), "Prompt override loaded");

    Ok(definition)
}

/// Ids of every `*.yml` directly under `prompts_dir`, sorted. A missing
/// directory has no overrides.
pub fn list_prompts(prompts_dir: &Path) -> AppResult<Vec<String>> {
    if !prompts_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut ids: Vec<String> = walkdir::WalkDir::new(prompts_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry.path().extension().and_then(|ext| ext.to_str()) == Some(PROMPT_EXTENSION)
        })
        .filter_map(|entry| {
            entry
                .path()
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string)
        })
        .collect();

    ids.sort();
    Ok(ids)
}

fn check_definition(definition: &PromptDefinition, expected_id: &str) -> AppResult<()> {
    if definition.id != expected_id {
        return Err(AppError::Prompt(format!(
            "{}.{} declares id '{}'",
            expected_id, PROMPT_EXTENSION, definition.id
        )));
    }

    let blank = [("title", &definition.title), ("template", &definition.template)]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty());
    if let Some((field, _)) = blank {
        return Err(AppError::Prompt(format!("Prompt '{}' has an empty {}", expected_id, field)));
    }

    Ok(())
}
