//! Host collaborators
//!
//! The engine never parses URLs, decides document boundaries or renders
//! anything itself; an embedder plugs those in here. The defaults treat a
//! fragment-only change as the only same-document navigation.

use url::{Origin, Url};

use sojourn_history::{HistoryEntry, NavigationType};
use sojourn_transition::NavigationError;

use crate::intent::DeferredAction;

/// Turns the string handed to `navigate()` into an absolute URL.
pub trait UrlResolver: Send + Sync {
    fn resolve(&self, base: Option<&Url>, input: &str) -> Result<Url, NavigationError>;
}

/// Decides whether a push/replace/reload keeps the current document.
pub trait DocumentClassifier: Send + Sync {
    fn is_same_document(
        &self,
        current: Option<&Url>,
        target: &Url,
        navigation_type: NavigationType,
    ) -> bool;
}

/// Produces the document for a committed entry.
///
/// Returning a deferred action makes rendering part of the transition's
/// deferral phase; `finished` then waits for it.
pub trait RenderHandler: Send + Sync {
    fn render(&self, entry: &HistoryEntry, navigation_type: NavigationType) -> Option<DeferredAction>;
}

/// Relative references are joined onto the current entry's URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardUrlResolver;

impl UrlResolver for StandardUrlResolver {
    fn resolve(&self, base: Option<&Url>, input: &str) -> Result<Url, NavigationError> {
        let input = input.trim();

        // Special protocols never resolve against a base
        if input.starts_with("about:") || input.starts_with("data:") {
            return Url::parse(input).map_err(|e| syntax_error(input, e));
        }

        Url::options()
            .base_url(base)
            .parse(input)
            .map_err(|e| syntax_error(input, e))
    }
}

fn syntax_error(input: &str, error: url::ParseError) -> NavigationError {
    NavigationError::Syntax(format!("cannot resolve '{}': {}", input, error))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FragmentClassifier;

impl DocumentClassifier for FragmentClassifier {
    fn is_same_document(
        &self,
        current: Option<&Url>,
        target: &Url,
        navigation_type: NavigationType,
    ) -> bool {
        match navigation_type {
            NavigationType::Push | NavigationType::Replace => {
                current.is_some_and(|current| is_fragment_change(current, target))
            }
            // Reloads always fetch the document again
            NavigationType::Reload | NavigationType::Traverse => false,
        }
    }
}

/// `target` differs from `current` at most in its fragment, and has one.
pub fn is_fragment_change(current: &Url, target: &Url) -> bool {
    target.fragment().is_some() && without_fragment(current) == without_fragment(target)
}

/// Whether a listener may take over the navigation with `transition_while`.
///
/// The destination must share the current URL's origin; a traversal must
/// also land on an entry of the current document.
pub fn can_transition(
    current: Option<&Url>,
    destination: Option<&Url>,
    navigation_type: NavigationType,
    destination_same_document: bool,
) -> bool {
    let (Some(current), Some(destination)) = (current, destination) else {
        return false;
    };
    if navigation_type == NavigationType::Traverse && !destination_same_document {
        return false;
    }
    same_origin(current, destination)
}

fn same_origin(a: &Url, b: &Url) -> bool {
    match (a.origin(), b.origin()) {
        (Origin::Tuple(..), Origin::Tuple(..)) => a.origin() == b.origin(),
        // Opaque origins (about:, data:, file:) only match their own document
        _ => without_fragment(a) == without_fragment(b),
    }
}

fn without_fragment(url: &Url) -> &str {
    &url[..url::Position::AfterQuery]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_resolve_relative_against_base() {
        let base = url("https://example.com/docs/a?x=1");
        let resolver = StandardUrlResolver;

        assert_eq!(
            resolver.resolve(Some(&base), "b").unwrap().as_str(),
            "https://example.com/docs/b"
        );
        assert_eq!(
            resolver.resolve(Some(&base), "#top").unwrap().as_str(),
            "https://example.com/docs/a?x=1#top"
        );
        assert_eq!(
            resolver.resolve(Some(&base), "https://other.org/").unwrap().as_str(),
            "https://other.org/"
        );
    }

    #[test]
    fn test_resolve_special_protocols() {
        let base = url("https://example.com/");
        let resolver = StandardUrlResolver;
        assert_eq!(resolver.resolve(Some(&base), "about:blank").unwrap().as_str(), "about:blank");
        assert_eq!(resolver.resolve(None, "about:blank").unwrap().as_str(), "about:blank");
    }

    #[test]
    fn test_resolve_malformed_is_syntax_error() {
        let resolver = StandardUrlResolver;
        let err = resolver.resolve(None, "no scheme here").unwrap_err();
        assert!(matches!(err, NavigationError::Syntax(_)));

        let base = url("https://example.com/");
        let err = resolver.resolve(Some(&base), "https://exa mple.com/").unwrap_err();
        assert!(matches!(err, NavigationError::Syntax(_)));
    }

    #[test]
    fn test_fragment_change() {
        let a = url("https://example.com/a");
        assert!(is_fragment_change(&a, &url("https://example.com/a#x")));
        assert!(!is_fragment_change(&a, &url("https://example.com/a")));
        assert!(!is_fragment_change(&a, &url("https://example.com/b#x")));
        assert!(!is_fragment_change(&a, &url("https://example.com/a?q#x")));
    }

    #[test]
    fn test_classifier() {
        let classifier = FragmentClassifier;
        let a = url("https://example.com/a");
        let a_hash = url("https://example.com/a#x");

        assert!(classifier.is_same_document(Some(&a), &a_hash, NavigationType::Push));
        assert!(classifier.is_same_document(Some(&a), &a_hash, NavigationType::Replace));
        assert!(!classifier.is_same_document(Some(&a), &a_hash, NavigationType::Reload));
        assert!(!classifier.is_same_document(None, &a_hash, NavigationType::Push));
    }

    #[test]
    fn test_can_transition() {
        let a = url("https://example.com/a");
        let b = url("https://example.com/b");
        let other = url("https://other.org/b");

        assert!(can_transition(Some(&a), Some(&b), NavigationType::Push, false));
        assert!(!can_transition(Some(&a), Some(&other), NavigationType::Push, false));
        assert!(!can_transition(Some(&a), Some(&b), NavigationType::Traverse, false));
        assert!(can_transition(Some(&a), Some(&b), NavigationType::Traverse, true));
        assert!(!can_transition(None, Some(&b), NavigationType::Push, false));
    }

    #[test]
    fn test_opaque_origins() {
        let blank = url("about:blank");
        assert!(can_transition(Some(&blank), Some(&url("about:blank#x")), NavigationType::Push, false));
        assert!(!can_transition(Some(&blank), Some(&url("about:srcdoc")), NavigationType::Push, false));
    }
}
