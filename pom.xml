<content>
=== END FILE ===

Make sure to use Quarkus BOM version 3.x and compatible dependencies.";

/// Plan, generate and test a Quarkus GraphQL + OpenTelemetry scaffold
pub fn quarkus_bootstrap_v1() -> Workflow {
    let generate = |name: &str, description: &str, model: &str, prompt: &str, output: &str, save: bool| {
        WorkflowStep {
            name: name.to_string(),
            kind: StepKind::GenerateText,
            description: description.to_string(),
            model: Some(model.to_string()),
            prompt: Some(prompt.to_string()),
            output_file: Some(output.to_string()),
            content: None,
            command: None,
            save_artifact: save,
            timeout_seconds: None,
            heartbeat_interval_seconds: None,
        }
    };

    Workflow {
        name: DEFAULT_WORKFLOW.to_string(),
        version: "1.0.0".to_string(),
        description: "Generate a Quarkus GraphQL + OpenTelemetry project scaffold".to_string(),
        steps: vec![
            generate(
                "planner",
                "Create project plan using Gemma3",
                "gemma3:27b",
                PLANNER_PROMPT,
                "PLAN.md",
                false,
            ),
            generate(
                "coder",
                "Generate Maven Quarkus project using Qwen3",
                "qwen3-coder:latest",
                CODER_PROMPT,
                "project_files.txt",
                true,
            ),
            WorkflowStep {
                name: "maven_test".to_string(),
                kind: StepKind::BuildCommand,
                description: "Run Maven test to verify project builds".to_string(),
                model: None,
                prompt: None,
                output_file: None,
                content: None,
                command: Some("test".to_string()),
                save_artifact: true,
                timeout_seconds: None,
                heartbeat_interval_seconds: None,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RELEASE_NOTES_YAML: &str = r#"
name: release-notes
description: Draft release notes
steps:
  - name: writer
    type: generate_text
    description: Draft notes using Llama
    model: llama3.2
    prompt: Summarize the changes
    output_file: NOTES.md
    save_artifact: true
    timeout_seconds: 120
  - name: stamp
    type: file_write
    output_file: VERSION
    content: "1.2.3"
  - name: list
    type: shell_command
    command: ls -la
"#;

    #[test]
    fn test_parse_workflow_yaml() {
        let workflow = Workflow::from_yaml(RELEASE_NOTES_YAML).unwrap();

        assert_eq!(workflow.name, "release-notes");
        assert_eq!(workflow.version, "1.0.0");
        assert_eq!(workflow.steps.len(), 3);
        assert_eq!(workflow.steps[0].kind, StepKind::GenerateText);
        assert_eq!(workflow.steps[0].timeout_seconds, Some(120));
        assert_eq!(workflow.steps[1].kind, StepKind::WriteFile);
        assert!(!workflow.steps[2].save_artifact);
    }

    #[test]
    fn test_validation_requires_step_inputs() {
        let yaml = r#"
name: broken
steps:
  - name: run
    type: shell_command
"#;
        let err = Workflow::from_yaml(yaml).unwrap_err();
        assert!(format!("{err:#}").contains("requires 'command'"));

        let yaml = r#"
name: dupes
steps:
  - { name: a, type: shell_command, command: "true" }
  - { name: a, type: shell_command, command: "true" }
"#;
        assert!(Workflow::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_builtin_workflow_is_valid() {
        let registry = WorkflowRegistry::builtin();
        let workflow = registry.get(DEFAULT_WORKFLOW).unwrap();

        workflow.validate().unwrap();
        assert_eq!(workflow.steps.len(), 3);
        assert_eq!(workflow.steps[2].kind, StepKind::BuildCommand);
        assert!(workflow.step("coder").unwrap().save_artifact);
    }

    #[test]
    fn test_load_dir_skips_invalid_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("notes.yaml"), RELEASE_NOTES_YAML).unwrap();
        std::fs::write(temp.path().join("broken.yml"), "name: [").unwrap();
        std::fs::write(temp.path().join("README.md"), "not a workflow").unwrap();

        let registry = WorkflowRegistry::load_dir(temp.path()).unwrap();
        assert_eq!(registry.names(), vec![DEFAULT_WORKFLOW, "release-notes"]);

        let missing = WorkflowRegistry::load_dir(&temp.path().join("absent")).unwrap();
        assert_eq!(missing.names(), vec![DEFAULT_WORKFLOW]);
    }

    #[test]
    fn test_describe_model() {
        assert_eq!(
            describe_model("Create project plan using Gemma3", "llama2:13b"),
            "Create project plan using llama2"
        );
        assert_eq!(
            describe_model("Run the planner", "llama2"),
            "Run the planner (model: llama2)"
        );
    }

    #[test]
    fn test_fallback_fills_unset_models_only() {
        let mut workflow = Workflow::from_yaml(RELEASE_NOTES_YAML).unwrap();
        workflow.steps[0].model = None;

        let none = HashMap::new();
        let resolved = apply_model_overrides(
            &workflow,
            &ModelOverrides {
                explicit: &none,
                environment: &none,
                fallback: Some("canned"),
            },
        );

        assert_eq!(resolved.steps[0].model.as_deref(), Some("canned"));
        assert_eq!(resolved.steps[0].description, "Draft notes using Llama");
        assert_eq!(resolved.steps[1], workflow.steps[1]);
    }
}
