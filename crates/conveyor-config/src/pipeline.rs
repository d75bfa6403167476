//! Pipeline document parsing and validation.

use conveyor_core::pipeline::Pipeline;

use crate::{ConfigError, ConfigResult};

/// Parse a rendered pipeline definition into a [`Pipeline`].
///
/// Validation is all-or-nothing: a document either yields a complete
/// pipeline or an error, never a partial one. The document kind must be
/// the literal `pipeline` and a step list must be present. Optional step
/// fields take their defaults here, at parse time; unrecognized fields
/// are ignored so newer documents stay loadable.
pub fn parse_pipeline(text: &str) -> ConfigResult<Pipeline> {
    let pipeline: Pipeline = serde_yaml::from_str(text)?;

    if pipeline.kind != "pipeline" {
        return Err(ConfigError::NotAPipeline {
            found: pipeline.kind,
        });
    }

    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_pipeline() {
        let doc = r#"
type: pipeline
steps:
  - name: echo
    environment: alpine
    command: echo hi
"#;
        let pipeline = parse_pipeline(doc).unwrap();
        assert_eq!(pipeline.kind, "pipeline");
        assert_eq!(pipeline.len(), 1);

        let step = &pipeline.steps[0];
        assert_eq!(step.name, "echo");
        assert_eq!(step.environment, "alpine");
        assert_eq!(step.command.as_deref(), Some("echo hi"));
    }

    #[test]
    fn test_optional_fields_default_at_parse_time() {
        let doc = r#"
type: pipeline
steps:
  - name: clone
    environment: alpine/git:latest
"#;
        let pipeline = parse_pipeline(doc).unwrap();
        let step = &pipeline.steps[0];

        assert!(step.command.is_none());
        assert!(step.params.is_empty());
        assert_eq!(step.user, 0);
        assert!(!step.dockersocket);
    }

    #[test]
    fn test_full_step_fields() {
        let doc = r#"
type: pipeline
steps:
  - name: image build
    environment: docker:stable
    command: docker build -t app:latest .
    params:
      REGISTRY: 127.0.0.1:5000
    user: 1000
    dockersocket: true
"#;
        let pipeline = parse_pipeline(doc).unwrap();
        let step = &pipeline.steps[0];

        assert_eq!(step.params.get("REGISTRY").unwrap(), "127.0.0.1:5000");
        assert_eq!(step.user, 1000);
        assert!(step.dockersocket);
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let doc = r#"
type: deployment
steps:
  - name: echo
    environment: alpine
"#;
        let err = parse_pipeline(doc).unwrap_err();
        match err {
            ConfigError::NotAPipeline { found } => assert_eq!(found, "deployment"),
            other => panic!("expected NotAPipeline, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_steps_is_rejected() {
        let doc = "type: pipeline\n";
        assert!(matches!(
            parse_pipeline(doc),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_empty_step_list_is_valid() {
        let doc = "type: pipeline\nsteps: []\n";
        let pipeline = parse_pipeline(doc).unwrap();
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let doc = r#"
type: pipeline
concurrency: 3
steps:
  - name: echo
    environment: alpine
    retries: 5
"#;
        let pipeline = parse_pipeline(doc).unwrap();
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_step_order_is_preserved() {
        let doc = r#"
type: pipeline
steps:
  - name: first
    environment: alpine
  - name: second
    environment: alpine
  - name: third
    environment: alpine
"#;
        let pipeline = parse_pipeline(doc).unwrap();
        let names: Vec<&str> = pipeline.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_malformed_yaml_is_rejected() {
        assert!(matches!(
            parse_pipeline("type: [unclosed"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
