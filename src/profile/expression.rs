//! Profile targeting expressions.
//!
//! A `target-profile` value is a list of expressions separated by `,`, `|` or
//! `;`. Each expression is a conjunction of tokens joined by ` AND `, and a
//! token may be negated with a `not:` prefix:
//!
//! ```text
//! profileX
//! profileX AND profileY
//! profileX AND not:profileY
//! ```

use super::{ProfileError, ProfileSet, DEFAULT_PROFILE};
use std::fmt;

const NEGATION_PREFIX: &str = "not:";
const WILDCARD: &str = "*";

/// One parsed profile targeting expression (a conjunction of tokens).
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTargetingExpression {
    expression: String,
    tokens: Vec<ExpressionToken>,
}

/// One token of a [`ProfileTargetingExpression`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionToken {
    profile: String,
    negated: bool,
}

impl ProfileTargetingExpression {
    /// Parse a single expression.
    pub fn parse(expression: &str) -> Result<Self, ProfileError> {
        if expression.trim().is_empty() {
            return Err(ProfileError::EmptyExpression);
        }

        let tokens = expression
            .split(" AND ")
            .map(|token| ExpressionToken::parse(token.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            expression: expression.to_string(),
            tokens,
        })
    }

    /// True iff every token matches the profile set.
    pub fn is_match(&self, profile_set: &ProfileSet) -> bool {
        self.tokens.iter().all(|t| t.is_match(profile_set))
    }

    /// Specificity of this expression for the profile set; 0 when it does not match.
    pub fn specificity(&self, profile_set: &ProfileSet) -> f64 {
        if !self.is_match(profile_set) {
            return 0.0;
        }

        self.tokens
            .iter()
            .filter(|t| t.is_match(profile_set))
            .map(|t| t.specificity(profile_set))
            .sum()
    }

    /// The source expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Parsed tokens, in declaration order.
    pub fn tokens(&self) -> &[ExpressionToken] {
        &self.tokens
    }
}

impl fmt::Display for ProfileTargetingExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl ExpressionToken {
    fn parse(token: &str) -> Result<Self, ProfileError> {
        let (profile, negated) = match token.strip_prefix(NEGATION_PREFIX) {
            Some(rest) => (rest.trim(), true),
            None => (token, false),
        };

        if profile.is_empty() {
            return Err(ProfileError::EmptyExpression);
        }

        Ok(Self {
            profile: profile.to_string(),
            negated,
        })
    }

    /// The profile named by this token (or `*`).
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Whether the token carries the `not:` prefix.
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Whether the token is the `*` wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.profile == WILDCARD
    }

    /// Does this token match the profile set.
    pub fn is_match(&self, profile_set: &ProfileSet) -> bool {
        if self.is_wildcard() {
            true
        } else if self.negated {
            !profile_set.is_member(&self.profile)
        } else {
            profile_set.is_member(&self.profile)
        }
    }

    /// Token specificity.
    ///
    /// Non-negated: 100 for the base profile, 10 (times `q` for weighted
    /// profiles) for a member sub-profile, 5 for the wildcard. Negated: 0 when
    /// the negated name is the base profile, a member, or the wildcard;
    /// otherwise 1.
    pub fn specificity(&self, profile_set: &ProfileSet) -> f64 {
        if self.negated {
            if profile_set.base_profile() == self.profile
                || profile_set.is_member(&self.profile)
                || self.is_wildcard()
            {
                return 0.0;
            }
            return 1.0;
        }

        if profile_set.base_profile().eq_ignore_ascii_case(&self.profile) {
            100.0
        } else if let Some(profile) = profile_set.profile(&self.profile) {
            10.0 * profile.weight().unwrap_or(1.0)
        } else if self.is_wildcard() {
            5.0
        } else {
            0.0
        }
    }
}

impl fmt::Display for ExpressionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str(NEGATION_PREFIX)?;
        }
        f.write_str(&self.profile)
    }
}

/// Parse a full `target-profile` value into its expressions.
///
/// A blank value defaults to [`DEFAULT_PROFILE`]. Empty segments between
/// separators are skipped.
pub fn parse_target_profile(
    target_profile: &str,
) -> Result<Vec<ProfileTargetingExpression>, ProfileError> {
    let target_profile = if target_profile.trim().is_empty() {
        DEFAULT_PROFILE
    } else {
        target_profile
    };

    let expressions = target_profile
        .split([',', '|', ';'])
        .filter(|segment| !segment.is_empty())
        .map(ProfileTargetingExpression::parse)
        .collect::<Result<Vec<_>, _>>()?;

    if expressions.is_empty() {
        return Err(ProfileError::EmptyExpression);
    }

    Ok(expressions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Profile;

    fn profile_set() -> ProfileSet {
        ProfileSet::new("uaCommonName").with_profiles(["profile1", "profile2", "profile3"])
    }

    fn specificity(target_profile: &str) -> f64 {
        let set = profile_set();
        parse_target_profile(target_profile)
            .unwrap()
            .iter()
            .map(|e| e.specificity(&set))
            .sum()
    }

    #[test]
    fn test_empty_expression_rejected() {
        assert_eq!(
            ProfileTargetingExpression::parse("  "),
            Err(ProfileError::EmptyExpression)
        );
        assert!(ProfileTargetingExpression::parse("not:").is_err());
    }

    #[test]
    fn test_blank_target_profile_defaults_to_wildcard() {
        let expressions = parse_target_profile("").unwrap();
        assert_eq!(expressions.len(), 1);
        assert!(expressions[0].tokens()[0].is_wildcard());
    }

    #[test]
    fn test_separators() {
        let expressions = parse_target_profile("a,b|c;d AND not:e").unwrap();
        assert_eq!(expressions.len(), 4);
        assert_eq!(expressions[3].tokens().len(), 2);
        assert!(expressions[3].tokens()[1].is_negated());
        assert_eq!(expressions[3].tokens()[1].profile(), "e");
    }

    #[test]
    fn test_negated_base_profile_does_not_match() {
        let set = ProfileSet::new("profileX");
        let expression = ProfileTargetingExpression::parse("not:profileX").unwrap();
        assert!(!expression.is_match(&set));
        assert_eq!(expression.specificity(&set), 0.0);
    }

    #[test]
    fn test_conjunction() {
        let set = profile_set();
        let expression = ProfileTargetingExpression::parse("uaCommonName AND profile2").unwrap();
        assert!(expression.is_match(&set));

        let expression =
            ProfileTargetingExpression::parse("uaCommonName AND not:profile2").unwrap();
        assert!(!expression.is_match(&set));
    }

    #[test]
    fn test_specificity_table() {
        assert_eq!(specificity("*"), 5.0);
        assert_eq!(specificity("uaCommonName"), 100.0);
        assert_eq!(specificity("X"), 0.0);
        assert_eq!(specificity("profile1"), 10.0);
        assert_eq!(specificity("uaCommonName, profile1"), 110.0);
        assert_eq!(specificity("uaCommonName, profile1, profile2"), 120.0);
        assert_eq!(specificity("profile1, profile2"), 20.0);
        assert_eq!(specificity("not:X"), 1.0);
        assert_eq!(specificity("not:uaCommonName"), 0.0);
        assert_eq!(specificity("not:profile2"), 0.0);
        assert_eq!(specificity("uaCommonName AND profile2"), 110.0);
        assert_eq!(specificity("uaCommonName AND not:X"), 101.0);
        assert_eq!(specificity("uaCommonName AND not:profile2"), 0.0);
        assert_eq!(specificity("not:X AND not:Y"), 2.0);
    }

    #[test]
    fn test_weighted_profile_specificity() {
        let mut set = ProfileSet::new("browser");
        set.add_profile(Profile::weighted("text/html", 0.5));
        let expression = ProfileTargetingExpression::parse("text/html").unwrap();
        assert_eq!(expression.specificity(&set), 5.0);
    }

    #[test]
    fn test_base_profile_case_insensitive_score() {
        let set = ProfileSet::new("Browser").with_profile("browser");
        let expression = ProfileTargetingExpression::parse("browser").unwrap();
        assert_eq!(expression.specificity(&set), 100.0);
    }
}
