// lib/creds/src/template.rs

use crate::error::TemplateError;

/// A compiled path template over the fixed `{{.Team}}`, `{{.Pipeline}}`,
/// `{{.Secret}}` vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretTemplate {
    name: String,
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Team,
    Pipeline,
    Secret,
}

impl SecretTemplate {
    pub fn build(name: &str, template: &str) -> Result<Self, TemplateError> {
        if template.is_empty() {
            return Err(TemplateError::Empty { name: name.to_string() });
        }

        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + 2..];
            let end = after_open.find("}}").ok_or_else(|| TemplateError::Parse {
                name: name.to_string(),
                reason: format!("unclosed action in {:?}", template),
            })?;

            let action = after_open[..end].trim();
            segments.push(match action {
                ".Team" => Segment::Team,
                ".Pipeline" => Segment::Pipeline,
                ".Secret" => Segment::Secret,
                "" => {
                    return Err(TemplateError::Parse {
                        name: name.to_string(),
                        reason: "missing value for command".to_string(),
                    });
                }
                other => {
                    return Err(TemplateError::UnknownPlaceholder {
                        name: name.to_string(),
                        placeholder: other.to_string(),
                    });
                }
            });
            rest = &after_open[end + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            source: template.to_string(),
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn references_pipeline(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Pipeline))
    }

    pub fn render(&self, team: &str, pipeline: &str, secret: &str) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Team => team,
                Segment::Pipeline => pipeline,
                Segment::Secret => secret,
            })
            .collect()
    }
}

impl std::fmt::Display for SecretTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_all_placeholders() {
        let template =
            SecretTemplate::build("pipeline", "/concourse/{{.Team}}/{{ .Pipeline }}/{{.Secret}}")
                .unwrap();
        assert_eq!(
            template.render("main", "deploy", "token"),
            "/concourse/main/deploy/token"
        );
        assert!(template.references_pipeline());
    }

    #[test]
    fn test_team_template_has_no_pipeline() {
        let template = SecretTemplate::build("team", "/concourse/{{.Team}}/{{.Secret}}").unwrap();
        assert!(!template.references_pipeline());
        assert_eq!(template.render("main", "", "token"), "/concourse/main/token");
    }

    #[test]
    fn test_literal_only_template() {
        let template = SecretTemplate::build("static", "shared/path").unwrap();
        assert_eq!(template.render("a", "b", "c"), "shared/path");
    }

    #[test]
    fn test_rejects_unknown_placeholders() {
        for source in [
            "/concourse/{{.Job}}/{{.Secret}}",
            "{{.team}}/{{.Secret}}",
            "{{.Team.Name}}",
            "{{printf \"%s\" .Secret}}",
            "{{Secret}}",
        ] {
            let result = SecretTemplate::build("bad", source);
            assert!(
                matches!(result, Err(TemplateError::UnknownPlaceholder { .. })),
                "{} should be rejected",
                source
            );
        }
    }

    #[test]
    fn test_rejects_empty_template() {
        assert_eq!(
            SecretTemplate::build("empty", ""),
            Err(TemplateError::Empty { name: "empty".to_string() })
        );
    }

    #[test]
    fn test_rejects_unclosed_action() {
        let result = SecretTemplate::build("broken", "/concourse/{{.Team");
        assert!(matches!(result, Err(TemplateError::Parse { .. })));

        let result = SecretTemplate::build("blank", "/concourse/{{ }}");
        assert!(matches!(result, Err(TemplateError::Parse { .. })));
    }
}
