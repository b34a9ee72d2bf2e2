//! Selector string to step chain compilation.

use super::{
    Predicate, QName, SelectorError, SelectorStep, StepKind, DOCUMENT_FRAGMENT_SELECTOR,
    LEGACY_DOCUMENT_FRAGMENT_SELECTOR,
};
use tracing::debug;

/// Characters the legacy tokenizer never accepts in a step name.
const LEGACY_INVALID_CHARS: &[char] = &['[', ']', '(', ')', '=', '\'', '"', ','];

/// Compile a selector into its step chain.
///
/// The selector is first parsed as a path expression. When that fails the
/// legacy tokenizer is tried (whitespace or `/` separated names with an
/// optional trailing `@attr`). If both fail the path expression error is
/// returned.
pub fn build_steps(selector: &str) -> Result<Vec<SelectorStep>, SelectorError> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(SelectorError::Empty);
    }

    let canonical = selector.replace(
        LEGACY_DOCUMENT_FRAGMENT_SELECTOR,
        DOCUMENT_FRAGMENT_SELECTOR,
    );
    if canonical
        .match_indices(DOCUMENT_FRAGMENT_SELECTOR)
        .any(|(i, _)| i != 0)
    {
        return Err(SelectorError::DocumentNotFirst {
            selector: selector.to_string(),
        });
    }

    let normalized = normalize(&canonical);
    match build_path_steps(&normalized, selector) {
        Ok(steps) => Ok(steps),
        Err(err) => {
            debug!(selector, error = %err, "Falling back to legacy selector tokenizer");
            build_legacy_steps(&canonical, selector).map_err(|legacy| {
                debug!(selector, error = %legacy, "Legacy selector tokenizer failed");
                err
            })
        }
    }
}

/// Rewrite a selector into plain path syntax.
///
/// Whitespace outside predicates becomes `/`, `#document` becomes a leading
/// `/`, and `**` becomes the `//` descendant separator.
fn normalize(selector: &str) -> String {
    let mut out = String::with_capacity(selector.len());
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut pending_separator = false;

    for c in selector.chars() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }

        if depth == 0 && c.is_whitespace() {
            pending_separator = true;
            continue;
        }
        if pending_separator {
            if !out.is_empty() && !out.ends_with('/') && c != '/' {
                out.push('/');
            }
            pending_separator = false;
        }

        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '\'' | '"' if depth > 0 => quote = Some(c),
            _ => {}
        }
        out.push(c);
    }

    let mut path = if out == DOCUMENT_FRAGMENT_SELECTOR {
        "/".to_string()
    } else if let Some(rest) = out.strip_prefix("#document/") {
        format!("/{}", rest)
    } else {
        out
    };

    path = path.replace("/**/", "//");
    if let Some(stripped) = path.strip_suffix("/**") {
        path = format!("{}//", stripped);
    }
    if let Some(stripped) = path.strip_prefix("**/") {
        path = format!("//{}", stripped);
    }
    path
}

fn build_path_steps(path: &str, selector: &str) -> Result<Vec<SelectorStep>, SelectorError> {
    let (rooted, body) = match path.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, path),
    };

    if body.is_empty() {
        return if rooted {
            Ok(vec![SelectorStep::document()])
        } else {
            Err(SelectorError::Empty)
        };
    }

    let segments = split_segments(body, selector)?;
    let last = segments.len() - 1;
    let mut steps: Vec<SelectorStep> = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            if i == last && (i == 0 || !segments[i - 1].is_empty()) {
                return Err(SelectorError::parse(selector, "trailing '/'"));
            }
            if !steps.last().is_some_and(SelectorStep::is_star_star) {
                steps.push(SelectorStep::new("**", "**"));
            }
            continue;
        }

        if matches!(*segment, "." | "..") || segment.contains("::") {
            return Err(SelectorError::parse(
                selector,
                format!("unsupported axis '{}'", segment),
            ));
        }

        let (name, predicates) = split_predicates(segment, selector)?;

        if let Some(attribute) = name.strip_prefix('@') {
            if i != last {
                return Err(SelectorError::parse(
                    selector,
                    "an attribute step may only be the last step",
                ));
            }
            validate_name(attribute, selector)?;
            let target = attribute_target(&mut steps);
            target.set_attribute(QName::parse(attribute));
            target.append_expression(segment);
            for predicate in predicates {
                target.add_predicate(Predicate::parse(predicate, selector)?);
            }
            continue;
        }

        if name == "**"
            && predicates.is_empty()
            && steps.last().is_some_and(SelectorStep::is_star_star)
        {
            continue;
        }
        if !matches!(name, "*" | "**") {
            validate_name(name, selector)?;
        }
        let mut step = SelectorStep::new(*segment, name);
        for predicate in predicates {
            step.add_predicate(Predicate::parse(predicate, selector)?);
        }
        steps.push(step);
    }

    if let Some(first) = steps.first_mut() {
        first.set_rooted(rooted);
    }

    let text_outside_target = steps
        .iter()
        .rev()
        .skip(1)
        .any(|s| s.predicate().is_some_and(Predicate::uses_text));
    if text_outside_target {
        return Err(SelectorError::TextNotLast {
            selector: selector.to_string(),
        });
    }

    Ok(steps)
}

fn build_legacy_steps(
    canonical: &str,
    selector: &str,
) -> Result<Vec<SelectorStep>, SelectorError> {
    let prefixed;
    let selector_with_root = if canonical.starts_with('/') {
        prefixed = format!("{}{}", DOCUMENT_FRAGMENT_SELECTOR, canonical);
        prefixed.as_str()
    } else {
        canonical
    };

    let tokens: Vec<&str> = if selector_with_root.contains('/') {
        selector_with_root
            .split('/')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    } else {
        selector_with_root.split_whitespace().collect()
    };
    if tokens.is_empty() {
        return Err(SelectorError::Empty);
    }

    let last = tokens.len() - 1;
    let mut steps: Vec<SelectorStep> = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        if token.contains(LEGACY_INVALID_CHARS)
            || matches!(*token, "." | "..")
            || token.contains("::")
        {
            return Err(SelectorError::parse(
                selector,
                format!("invalid token '{}'", token),
            ));
        }

        if let Some(attribute) = token.strip_prefix('@') {
            if i != last || attribute.is_empty() {
                return Err(SelectorError::parse(
                    selector,
                    "an attribute token may only be the last token",
                ));
            }
            let target = attribute_target(&mut steps);
            target.set_attribute(QName::parse(attribute));
            target.append_expression(token);
            continue;
        }

        let step = if *token == DOCUMENT_FRAGMENT_SELECTOR {
            SelectorStep::document()
        } else {
            SelectorStep::new(*token, token)
        };
        steps.push(step.with_predicate(Predicate::PassThru));
    }

    Ok(steps)
}

/// Element step an attribute step merges into. A standalone attribute targets `*`.
fn attribute_target(steps: &mut Vec<SelectorStep>) -> &mut SelectorStep {
    let needs_element = steps
        .last()
        .map_or(true, |s| s.kind() == StepKind::StarStar || s.is_document());
    if needs_element {
        steps.push(SelectorStep::new("*", "*"));
    }
    let last = steps.len() - 1;
    &mut steps[last]
}

fn split_segments<'a>(body: &'a str, selector: &str) -> Result<Vec<&'a str>, SelectorError> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| SelectorError::parse(selector, "unbalanced ']'"))?;
            }
            '\'' | '"' if depth > 0 => quote = Some(c),
            '/' if depth == 0 => {
                segments.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 || quote.is_some() {
        return Err(SelectorError::parse(selector, "unbalanced predicate brackets"));
    }
    segments.push(&body[start..]);
    Ok(segments)
}

/// Split `name[p1][p2]` into the name and the predicate bodies.
fn split_predicates<'a>(
    segment: &'a str,
    selector: &str,
) -> Result<(&'a str, Vec<&'a str>), SelectorError> {
    let Some(open) = segment.find('[') else {
        return Ok((segment, Vec::new()));
    };

    let name = &segment[..open];
    let mut predicates = Vec::new();
    let mut rest = &segment[open..];

    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return Err(SelectorError::parse(
                selector,
                format!("unexpected '{}' after predicate", rest),
            ));
        }
        let close = matching_bracket(rest)
            .ok_or_else(|| SelectorError::parse(selector, "unbalanced predicate brackets"))?;
        predicates.push(&rest[1..close]);
        rest = &rest[close + 1..];
    }

    Ok((name, predicates))
}

fn matching_bracket(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn validate_name(name: &str, selector: &str) -> Result<(), SelectorError> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        chars
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    };

    let valid = match name.split_once(':') {
        Some((prefix, local)) => valid_part(prefix) && valid_part(local),
        None => valid_part(name),
    };
    if valid {
        Ok(())
    } else {
        Err(SelectorError::parse(
            selector,
            format!("invalid name '{}'", name),
        ))
    }
}

/// Display form of a step chain, `#document/` prefixed when rooted.
pub fn steps_to_string(steps: &[SelectorStep]) -> String {
    let joined = steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("/");
    match steps.first() {
        Some(first) if first.is_rooted() && !first.is_document() => {
            format!("{}/{}", DOCUMENT_FRAGMENT_SELECTOR, joined)
        }
        _ => joined,
    }
}

/// A selector string that compiles back to an equivalent step chain.
pub fn to_selector_string(steps: &[SelectorStep]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(steps.len() + 1);
    for (i, step) in steps.iter().enumerate() {
        if step.is_document() {
            parts.push(DOCUMENT_FRAGMENT_SELECTOR.to_string());
            continue;
        }
        if i == 0 && step.is_rooted() {
            parts.push(DOCUMENT_FRAGMENT_SELECTOR.to_string());
        }
        parts.push(step.to_source());
        if let Some(attribute) = step.attribute() {
            parts.push(format!("@{}", attribute.to_source()));
        }
    }
    parts.join("/")
}

/// The step names (plus a trailing `@attr`) of a step chain.
pub fn contextual_selector(steps: &[SelectorStep]) -> Vec<String> {
    let mut tokens: Vec<String> = steps
        .iter()
        .map(|step| match step.kind() {
            StepKind::Star => "*".to_string(),
            StepKind::StarStar => "**".to_string(),
            StepKind::Named => step.target().local_part().to_string(),
        })
        .collect();
    if let Some(attribute) = steps.last().and_then(SelectorStep::attribute) {
        tokens.push(format!("@{}", attribute.local_part()));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(selector: &str) -> String {
        steps_to_string(&build_steps(selector).unwrap())
    }

    #[test]
    fn test_simple_paths() {
        let steps = build_steps("order/order-header").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].target().local_part(), "order-header");
        assert!(!steps[0].is_rooted());

        assert_eq!(display("table tr td"), "table/tr/td");
        assert_eq!(display("a / b"), "a/b");
    }

    #[test]
    fn test_document_forms() {
        let steps = build_steps("#document").unwrap();
        assert_eq!(steps.len(), 1);
        assert!(steps[0].is_document());

        let steps = build_steps("$document").unwrap();
        assert!(steps[0].is_document());

        let steps = build_steps("#document/a/**/c").unwrap();
        assert_eq!(steps.len(), 3);
        assert!(steps[0].is_rooted());
        assert!(steps[1].is_star_star());
        assert_eq!(steps_to_string(&steps), "#document/a/**/c");

        let steps = build_steps("/a/b").unwrap();
        assert!(steps[0].is_rooted());
    }

    #[test]
    fn test_document_not_first() {
        assert!(matches!(
            build_steps("a/#document"),
            Err(SelectorError::DocumentNotFirst { .. })
        ));
    }

    #[test]
    fn test_star_star_forms() {
        assert_eq!(display("**"), "**");
        assert_eq!(display("a/**"), "a/**");
        assert_eq!(display("**/a"), "**/a");
        assert_eq!(display("a//b"), "a/**/b");
        assert_eq!(display("a/**/**/b"), "a/**/b");
        assert!(!build_steps("/**/a").unwrap()[0].is_rooted());
    }

    #[test]
    fn test_predicate_display() {
        assert_eq!(display("x/y[@d = '23']/*"), "x/y(@d = '23')/*");
        assert_eq!(display("x/y[@g='987']/@c"), "x/y{@c}(@g = '987')");
        assert_eq!(display("x/y/@c[@g='987']"), "x/y{@c}(@g = '987')");
        assert_eq!(display("a/b[2]/c"), "a/b[2]/c");
        assert_eq!(display("a/b[2][@a = 's']/c"), "a/b([2] and (@a = 's'))/c");
    }

    #[test]
    fn test_spaces_inside_predicates_are_kept() {
        let steps = build_steps("a b[@x = 'hello world']").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps_to_string(&steps), "a/b(@x = 'hello world')");
    }

    #[test]
    fn test_attribute_targets() {
        let steps = build_steps("a/b/@c").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].attribute().map(QName::local_part), Some("c"));
        assert_eq!(contextual_selector(&steps), vec!["a", "b", "@c"]);

        let steps = build_steps("@c").unwrap();
        assert_eq!(steps.len(), 1);
        assert!(steps[0].is_star());

        let steps = build_steps("a/**/@c").unwrap();
        assert_eq!(steps.len(), 3);
        assert!(steps[2].is_star());
    }

    #[test]
    fn test_invalid_selectors() {
        for selector in [
            "chapter[title=\"Introduction\"]",
            "para[last()]",
            "a/../para",
            "employee[@secretary and @assistant]",
            "x/@v/@c",
            "a/b[",
            "a/b]",
            "a/child::b",
        ] {
            assert!(
                build_steps(selector).is_err(),
                "expected '{}' to be rejected",
                selector
            );
        }
        assert_eq!(build_steps("  "), Err(SelectorError::Empty));
    }

    #[test]
    fn test_text_only_on_last_step() {
        assert!(build_steps("a/b[text() = 'x']").is_ok());
        assert!(matches!(
            build_steps("a[text() = 'x']/b"),
            Err(SelectorError::TextNotLast { .. })
        ));
    }

    #[test]
    fn test_legacy_fallback() {
        let steps = build_steps("1st 2nd").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].predicate(), Some(&Predicate::PassThru));

        let steps = build_steps("/1st/2nd/@x").unwrap();
        assert_eq!(steps.len(), 3);
        assert!(steps[0].is_document());
        assert_eq!(steps[2].attribute().map(QName::local_part), Some("x"));
    }

    #[test]
    fn test_selector_string_round_trip() {
        for selector in [
            "a/b/c",
            "#document/a/**/c",
            "x/y[@d = '23']/*",
            "x/y[@g='987']/@c",
            "a/b[2][@a = 's' or @b != 't']/c",
            "x[@a = '1' and (@b = '2' or @c = '3')]",
            "#document",
            "**/a",
            "a:b/c",
        ] {
            let steps = build_steps(selector).unwrap();
            let rebuilt = build_steps(&to_selector_string(&steps)).unwrap();
            assert_eq!(steps_to_string(&steps), steps_to_string(&rebuilt), "{}", selector);
        }
    }
}
