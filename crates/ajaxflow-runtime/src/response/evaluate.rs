//! Splitting `evaluate` payloads into plain and suspending scripts.
//!
//! A payload whose last statement is `(function(){name|body})();` opts
//! into manual notification: it is split into its
//! `(function(){...})();` segments, and each segment of the
//! `name|body` form is handed to the script host together with a
//! suspend lock. Any other payload is one plain script.

const SEGMENT_OPEN: &str = "(function(){";
const SEGMENT_CLOSE: &str = "})();";

/// One unit of evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalScript {
    /// Evaluate and move on.
    Plain(String),
    /// Evaluate with a suspend lock the host must notify.
    Suspending {
        /// Name the body uses for its notify function.
        identifier: String,
        /// Script body.
        body: String,
    },
}

/// Splits an `evaluate` payload.
#[must_use]
pub fn split_evaluate(text: &str) -> Vec<EvalScript> {
    if !ends_with_suspending(text) {
        return vec![EvalScript::Plain(text.to_string())];
    }

    let mut scripts = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(SEGMENT_OPEN) {
        let after_open = start + SEGMENT_OPEN.len();
        let Some(close) = rest[after_open..].find(SEGMENT_CLOSE) else {
            break;
        };
        let end = after_open + close + SEGMENT_CLOSE.len();
        let segment = &rest[start..end];
        scripts.push(match suspending_parts(&rest[after_open..after_open + close]) {
            Some((identifier, body)) => EvalScript::Suspending {
                identifier: identifier.to_string(),
                body: body.to_string(),
            },
            None => EvalScript::Plain(segment.to_string()),
        });
        rest = &rest[end..];
    }
    scripts
}

fn ends_with_suspending(text: &str) -> bool {
    let text = text.trim_end();
    if !text.ends_with(SEGMENT_CLOSE) {
        return false;
    }
    text.match_indices(SEGMENT_OPEN).any(|(i, _)| {
        let inner = &text[i + SEGMENT_OPEN.len()..];
        inner
            .split_once('|')
            .is_some_and(|(ident, _)| is_identifier(ident))
    })
}

fn suspending_parts(inner: &str) -> Option<(&str, &str)> {
    let (ident, body) = inner.split_once('|')?;
    is_identifier(ident).then_some((ident, body))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_payload_is_one_script() {
        assert_eq!(
            split_evaluate("alert(1); alert(2);"),
            [EvalScript::Plain("alert(1); alert(2);".into())]
        );
        // an IIFE without identifier form stays whole
        assert_eq!(
            split_evaluate("(function(){ a(); })();"),
            [EvalScript::Plain("(function(){ a(); })();".into())]
        );
    }

    #[test]
    fn suspending_segment() {
        assert_eq!(
            split_evaluate("(function(){done|fadeOut(done);})();"),
            [EvalScript::Suspending {
                identifier: "done".into(),
                body: "fadeOut(done);".into()
            }]
        );
    }

    #[test]
    fn mixed_segments_keep_order() {
        let scripts =
            split_evaluate("(function(){ prep(); })();\n(function(){n|anim(n);})();(function(){$cb|x($cb);})();");
        assert_eq!(
            scripts,
            [
                EvalScript::Plain("(function(){ prep(); })();".into()),
                EvalScript::Suspending {
                    identifier: "n".into(),
                    body: "anim(n);".into()
                },
                EvalScript::Suspending {
                    identifier: "$cb".into(),
                    body: "x($cb);".into()
                },
            ]
        );
    }

    #[test]
    fn identifier_rules() {
        assert!(is_identifier("notify"));
        assert!(is_identifier("_a1"));
        assert!(is_identifier("$"));
        assert!(!is_identifier("1a"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a b"));
        // `a || b` is an expression, not the identifier form
        assert_eq!(split_evaluate("(function(){ a || b })();").len(), 1);
    }
}
