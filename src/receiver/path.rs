//! Ingestion path template
//!
//! The configured path must end in the four document placeholders. Missing
//! ones are appended in order, and the completed template is matched against
//! request paths segment by segment.

/// Placeholder names, in the order they must appear
pub const PATH_PARAMS: [&str; 4] = [
    "namespace",
    "document_type",
    "document_version",
    "document_id",
];

/// Append any document placeholders missing from `path`
///
/// A template that already carries all four placeholders is returned as is.
pub fn complete_path_template(path: &str) -> String {
    let placeholders = PATH_PARAMS.map(|p| format!("{{{p}}}"));
    if placeholders.iter().all(|p| path.contains(p.as_str())) {
        return path.to_string();
    }

    let mut completed = path.to_string();
    for placeholder in &placeholders {
        if !completed.contains(placeholder.as_str()) {
            completed = format!("{}/{}", completed.trim_end_matches('/'), placeholder);
        }
    }
    completed
}

/// Document identifiers captured from a request path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    /// Application namespace
    pub namespace: String,
    /// Ping type
    pub document_type: String,
    /// Ping schema version
    pub document_version: String,
    /// Unique document identifier
    pub document_id: String,
}

impl PathParams {
    /// Segments in forwarding order
    pub fn segments(&self) -> [&str; 4] {
        [
            &self.namespace,
            &self.document_type,
            &self.document_version,
            &self.document_id,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A completed path template that matches request paths
#[derive(Debug, Clone)]
pub struct PathTemplate {
    template: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Complete and compile a configured path
    pub fn new(path: &str) -> Self {
        let template = complete_path_template(path);
        let segments = split(&template)
            .map(|segment| {
                match segment
                    .strip_prefix('{')
                    .and_then(|s| s.strip_suffix('}'))
                {
                    Some(name) if !name.is_empty() => Segment::Param(name.to_string()),
                    _ => Segment::Literal(segment.to_string()),
                }
            })
            .collect();

        Self { template, segments }
    }

    /// The completed template
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Match a request path, capturing the document identifiers
    ///
    /// Placeholders match exactly one non-empty segment.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let mut params = PathParams::default();
        let mut request = split(path);

        for segment in &self.segments {
            let value = request.next()?;
            match segment {
                Segment::Literal(literal) if literal == value => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if value.is_empty() => return None,
                Segment::Param(name) => match name.as_str() {
                    "namespace" => params.namespace = value.to_string(),
                    "document_type" => params.document_type = value.to_string(),
                    "document_version" => params.document_version = value.to_string(),
                    "document_id" => params.document_id = value.to_string(),
                    _ => {}
                },
            }
        }

        if request.next().is_some() {
            return None;
        }
        Some(params)
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.strip_prefix('/').unwrap_or(path).split('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str =
        "/submit/telemetry/{namespace}/{document_type}/{document_version}/{document_id}";

    #[test]
    fn test_completes_default_path() {
        assert_eq!(complete_path_template("/submit/telemetry"), FULL);
        assert_eq!(complete_path_template("/submit/telemetry/"), FULL);
    }

    #[test]
    fn test_completion_is_idempotent() {
        assert_eq!(complete_path_template(FULL), FULL);
        let once = complete_path_template("/custom");
        assert_eq!(complete_path_template(&once), once);
    }

    #[test]
    fn test_partial_template_gets_missing_suffix() {
        assert_eq!(
            complete_path_template("/submit/{namespace}/{document_type}"),
            "/submit/{namespace}/{document_type}/{document_version}/{document_id}"
        );
    }

    #[test]
    fn test_matches_request_path() {
        let template = PathTemplate::new("/submit/telemetry");
        let params = template
            .matches("/submit/telemetry/my-app/metrics/1/abc-123")
            .unwrap();
        assert_eq!(
            params.segments(),
            ["my-app", "metrics", "1", "abc-123"]
        );
    }

    #[test]
    fn test_rejects_mismatched_paths() {
        let template = PathTemplate::new("/submit/telemetry");
        assert!(template.matches("/submit/telemetry/a/b/c").is_none());
        assert!(template.matches("/submit/telemetry/a/b/c/d/e").is_none());
        assert!(template.matches("/submit/other/a/b/c/d").is_none());
        assert!(template.matches("/submit/telemetry/a//c/d").is_none());
    }
}
