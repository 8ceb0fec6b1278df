use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};

use crate::error::BoxError;
use crate::field_map::{FieldMap, FieldValue};
use crate::report::ValidationError;

/// A field-level check run against the collected body once the whole stream has
/// been received.
///
/// Findings are returned as `Ok` entries; an `Err` means the rule itself could not
/// run and fails the request with a server error.
pub trait Rule: Send + Sync {
    fn run<'a>(&'a self, body: &'a FieldMap) -> BoxFuture<'a, Result<Vec<ValidationError>, BoxError>>;
}

/// An ordered list of independent validation rules.
#[derive(Clone, Default)]
pub struct ValidationRules {
    rules: Vec<Arc<dyn Rule>>,
}

impl ValidationRules {
    pub fn new() -> ValidationRules {
        ValidationRules::default()
    }

    pub fn rule<R: Rule + 'static>(mut self, rule: R) -> ValidationRules {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Runs every rule concurrently and returns their findings in rule order.
    pub async fn run_all(&self, body: &FieldMap) -> crate::Result<Vec<ValidationError>> {
        let findings = future::try_join_all(self.rules.iter().map(|rule| rule.run(body)))
            .await
            .map_err(crate::Error::ValidationFailed)?;

        Ok(findings.into_iter().flatten().collect())
    }
}

impl Debug for ValidationRules {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRules").field("len", &self.rules.len()).finish()
    }
}

/// A synchronous predicate over one field, see [`check`].
pub struct Check<P> {
    path: String,
    message: String,
    predicate: P,
}

impl<P> Rule for Check<P>
where
    P: Fn(Option<&FieldValue>) -> bool + Send + Sync,
{
    fn run<'a>(&'a self, body: &'a FieldMap) -> BoxFuture<'a, Result<Vec<ValidationError>, BoxError>> {
        let value = body.get(&self.path);

        let findings = if (self.predicate)(value) {
            Vec::new()
        } else {
            let err = ValidationError::field(self.path.as_str(), self.message.as_str());
            vec![match value {
                Some(value) => err.with_value(value.to_json()),
                None => err,
            }]
        };

        future::ready(Ok(findings)).boxed()
    }
}

/// Reports `message` for `path` when `predicate` returns false for the field's value.
pub fn check<N, M, P>(path: N, message: M, predicate: P) -> Check<P>
where
    N: Into<String>,
    M: Into<String>,
    P: Fn(Option<&FieldValue>) -> bool + Send + Sync,
{
    Check {
        path: path.into(),
        message: message.into(),
        predicate,
    }
}

/// Reports a field that is missing or blank.
pub fn required<N: Into<String>>(path: N) -> Check<impl Fn(Option<&FieldValue>) -> bool + Send + Sync> {
    let path = path.into();
    let message = format!("{} is required", path);

    check(path, message, |value: Option<&FieldValue>| {
        value.map_or(false, |value| value.values().iter().any(|v| !v.trim().is_empty()))
    })
}

/// An asynchronous rule built from a closure, see [`from_fn`].
pub struct FnRule<F> {
    f: F,
}

impl<F, Fut> Rule for FnRule<F>
where
    F: Fn(FieldMap) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<ValidationError>, BoxError>> + Send + 'static,
{
    fn run<'a>(&'a self, body: &'a FieldMap) -> BoxFuture<'a, Result<Vec<ValidationError>, BoxError>> {
        (self.f)(body.clone()).boxed()
    }
}

/// Wraps an async closure receiving a snapshot of the body, e.g. for a lookup against
/// a database that reports a taken username.
pub fn from_fn<F, Fut>(f: F) -> FnRule<F>
where
    F: Fn(FieldMap) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<ValidationError>, BoxError>> + Send + 'static,
{
    FnRule { f }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> FieldMap {
        let mut body = FieldMap::new();
        body.collect("name", "John", false);
        body.collect("email", "   ", false);
        body
    }

    #[tokio::test]
    async fn test_required() {
        let rules = ValidationRules::new()
            .rule(required("name"))
            .rule(required("email"))
            .rule(required("age"));

        let findings = rules.run_all(&body()).await.unwrap();

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].path, "email");
        assert_eq!(findings[0].message, "email is required");
        assert_eq!(findings[0].value, Some(json!("   ")));
        assert_eq!(findings[1].path, "age");
        assert_eq!(findings[1].value, None);
    }

    #[tokio::test]
    async fn test_check() {
        let rules = ValidationRules::new().rule(check("name", "Name too short", |value| {
            value.and_then(FieldValue::as_single).map_or(false, |name| name.len() >= 5)
        }));

        let findings = rules.run_all(&body()).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "Name too short");
        assert_eq!(findings[0].location, "body");
    }

    #[tokio::test]
    async fn test_from_fn_failure() {
        let rules = ValidationRules::new()
            .rule(required("name"))
            .rule(from_fn(|_body| async { Err::<Vec<ValidationError>, BoxError>("lookup unavailable".into()) }));

        let err = rules.run_all(&body()).await.unwrap_err();
        assert_eq!(err.to_string(), "lookup unavailable");
    }

    #[tokio::test]
    async fn test_empty_rules() {
        assert!(ValidationRules::new().run_all(&FieldMap::new()).await.unwrap().is_empty());
    }
}
