//! Prompt loading: built-in definitions with per-workspace overrides.

use crate::types::PromptDefinition;
use research_core::{AppError, AppResult};
use std::path::Path;

/// Query generation prompt.
pub const QUERY_PROMPT_ID: &str = "research.queries";

/// Sufficiency grading prompt.
pub const GRADE_PROMPT_ID: &str = "research.grade";

/// Answer synthesis prompt.
pub const SYNTHESIS_PROMPT_ID: &str = "research.synthesize";

const BUILTIN_PROMPTS: [(&str, &str); 3] = [
    (
        QUERY_PROMPT_ID,
        include_str!("../prompts/research.queries.yml"),
    ),
    (GRADE_PROMPT_ID, include_str!("../prompts/research.grade.yml")),
    (
        SYNTHESIS_PROMPT_ID,
        include_str!("../prompts/research.synthesize.yml"),
    ),
];

/// Parse one of the prompt definitions compiled into the binary.
pub fn builtin_prompt(prompt_id: &str) -> AppResult<PromptDefinition> {
    let (_, contents) = BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("Unknown built-in prompt: {}", prompt_id)))?;

    parse_prompt(contents, prompt_id)
}

/// Load a prompt definition by ID from the workspace.
///
/// Searches for `<id>.yml` in the `.research/prompts/` directory.
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = workspace_path
        .join(".research/prompts")
        .join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition = parse_prompt(&contents, &prompt_file.display().to_string())?;
    tracing::info!("Loaded prompt override: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// Workspace override when present, otherwise the built-in definition.
pub fn resolve_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let override_file = workspace_path
        .join(".research/prompts")
        .join(format!("{}.yml", prompt_id));

    if override_file.exists() {
        load_prompt(workspace_path, prompt_id)
    } else {
        builtin_prompt(prompt_id)
    }
}

/// List prompt overrides present in the workspace.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let prompts_dir = workspace_path.join(".research/prompts");

    if !prompts_dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids = Vec::new();

    for entry in walkdir::WalkDir::new(&prompts_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                prompt_ids.push(stem.to_string());
            }
        }
    }

    prompt_ids.sort();
    Ok(prompt_ids)
}

fn parse_prompt(contents: &str, source: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents)
        .map_err(|e| AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", source, e)))?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    if def.output.format == "json" && def.output.schema.is_none() {
        return Err(AppError::Prompt(format!(
            "Prompt {} declares json output without a schema",
            def.id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_override(dir: &Path, id: &str, contents: &str) -> PathBuf {
        let prompts_dir = dir.join(".research/prompts");
        fs::create_dir_all(&prompts_dir).unwrap();
        let file_path = prompts_dir.join(format!("{}.yml", id));
        fs::write(&file_path, contents).unwrap();
        file_path
    }

    fn override_yaml(id: &str) -> String {
        format!(
            r#"
id: {}
title: "Terse grading"
apiVersion: "1.1"
behavior:
  tone: blunt
  style: terse
template: "{{{{originalQuery}}}} / {{{{context}}}}"
output:
  format: json
  schema:
    type: object
    required: [decision]
"#,
            id
        )
    }

    #[test]
    fn test_builtin_prompts_parse() {
        for id in [QUERY_PROMPT_ID, GRADE_PROMPT_ID, SYNTHESIS_PROMPT_ID] {
            let def = builtin_prompt(id).unwrap();
            assert_eq!(def.id, id);
            assert!(def.system.is_some());
            assert!(def.output.schema.is_some());
        }
    }

    #[test]
    fn test_grade_schema_lists_all_decisions() {
        let def = builtin_prompt(GRADE_PROMPT_ID).unwrap();
        let schema = def.output.schema.unwrap();
        let decisions = schema["properties"]["decision"]["enum"].as_array().unwrap();
        assert_eq!(decisions.len(), 4);
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(builtin_prompt("research.summarize").is_err());
    }

    #[test]
    fn test_resolve_prefers_workspace_override() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), GRADE_PROMPT_ID, &override_yaml(GRADE_PROMPT_ID));

        let def = resolve_prompt(temp_dir.path(), GRADE_PROMPT_ID).unwrap();
        assert_eq!(def.title, "Terse grading");

        let fallback = resolve_prompt(temp_dir.path(), QUERY_PROMPT_ID).unwrap();
        assert_eq!(fallback.id, QUERY_PROMPT_ID);
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), "broken", "invalid: yaml: content:");
        assert!(load_prompt(temp_dir.path(), "broken").is_err());
    }

    #[test]
    fn test_list_prompts() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), "b.prompt", &override_yaml("b.prompt"));
        write_override(temp_dir.path(), "a.prompt", &override_yaml("a.prompt"));

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts, vec!["a.prompt".to_string(), "b.prompt".to_string()]);
    }
}
