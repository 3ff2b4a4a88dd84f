//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
use handlebars::Handlebars;
use research_core::{AppError, AppResult};
use std::collections::HashMap;

/// Build a prompt from a definition and input variables.
///
/// Both the system and user templates are rendered with the same variables.
/// Rendering is strict: a template that references a variable missing from
/// `variables` is an error rather than an empty substitution.
///
/// # Example
/// ```no_run
/// use research_prompt::{build_prompt, builtin_prompt, QUERY_PROMPT_ID};
/// use std::collections::HashMap;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = builtin_prompt(QUERY_PROMPT_ID)?;
/// let mut vars = HashMap::new();
/// vars.insert("originalQuery".to_string(), "How is the filter replaced?".to_string());
/// let built = build_prompt(&def, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars.set_strict_mode(true);

    let system = definition
        .system
        .as_deref()
        .map(|template| render(&mut handlebars, "system", template, &variables))
        .transpose()?;
    let user = render(&mut handlebars, "user", &definition.template, &variables)?;

    Ok(BuiltPrompt {
        system,
        user,
        schema: definition.output.schema.clone(),
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            resolved_variables: variables,
        },
    })
}

fn render(
    handlebars: &mut Handlebars<'_>,
    name: &str,
    template: &str,
    variables: &HashMap<String, String>,
) -> AppResult<String> {
    handlebars
        .register_template_string(name, template)
        .map_err(|e| AppError::Prompt(format!("Failed to register {} template: {}", name, e)))?;

    handlebars
        .render(name, variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render {} template: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PromptBehavior, PromptOutputSpec};

    fn definition(system: Option<&str>, template: &str) -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            created_by: "test".to_string(),
            behavior: PromptBehavior {
                tone: "technical".to_string(),
                style: "concise".to_string(),
            },
            system: system.map(String::from),
            template: template.to_string(),
            output: PromptOutputSpec {
                format: "json".to_string(),
                schema: Some(serde_json::json!({"type": "object"})),
            },
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_renders_system_and_user() {
        let def = definition(Some("Answer with {{sentinel}}"), "Q: {{question}}");
        let built = build_prompt(
            &def,
            vars(&[("question", "What is the torque?"), ("sentinel", "N/A")]),
        )
        .unwrap();

        assert_eq!(built.system.as_deref(), Some("Answer with N/A"));
        assert_eq!(built.user, "Q: What is the torque?");
        assert!(built.schema.is_some());
        assert_eq!(built.metadata.source_prompt_id, "test.prompt");
    }

    #[test]
    fn test_no_html_escaping() {
        let def = definition(None, "{{context}}");
        let built = build_prompt(&def, vars(&[("context", "a < b && \"c\"")])).unwrap();
        assert_eq!(built.user, "a < b && \"c\"");
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        let def = definition(None, "{{question}} {{context}}");
        let result = build_prompt(&def, vars(&[("question", "q")]));
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }
}
