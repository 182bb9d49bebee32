//! Per-step rule hooks.
//!
//! Business rules that used to be special-cased inside the wizard live here
//! as registered `StepRule`s:
//! - an exclusive "None of the above" option on multi-select steps
//! - UTM attribution derived from the traffic-source answer
//!
//! The sequencer only asks the `RuleBook` what a pick does and which extra
//! fields an answer derives; adding a rule never touches transition logic.

use serde::{Deserialize, Serialize};

use super::answers::AnswerValue;
use super::catalog::{StepDefinition, StepKind, NONE_OF_THE_ABOVE, TRAFFIC_SOURCE_STEP};

/// What a rule did with a pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickEffect {
    /// Fall through to the next rule, then to the default toggle.
    Continue,
    /// The rule set the selection itself.
    Handled { commit_now: bool },
}

/// A declarative hook attached to the steps it applies to.
pub trait StepRule: Send + Sync {
    /// Rule name for logging.
    fn name(&self) -> &'static str;

    fn applies_to(&self, step: &StepDefinition) -> bool;

    /// Runs before the default toggle on multi-select steps.
    fn on_pick(&self, _step: &StepDefinition, _selection: &mut Vec<String>, _option: &str) -> PickEffect {
        PickEffect::Continue
    }

    /// Extra fields to store alongside the step's own answer.
    fn derive(&self, _step: &StepDefinition, _value: &AnswerValue) -> Vec<(String, AnswerValue)> {
        Vec::new()
    }
}

/// An option that excludes every other pick.
pub struct ExclusiveOption {
    option: String,
}

impl ExclusiveOption {
    pub fn new(option: impl Into<String>) -> Self {
        Self {
            option: option.into(),
        }
    }
}

impl StepRule for ExclusiveOption {
    fn name(&self) -> &'static str {
        "exclusive_option"
    }

    fn applies_to(&self, step: &StepDefinition) -> bool {
        step.kind.is_multi_select() && step.has_option(&self.option)
    }

    fn on_pick(&self, step: &StepDefinition, selection: &mut Vec<String>, option: &str) -> PickEffect {
        if option == self.option {
            selection.clear();
            selection.push(self.option.clone());
            // Compact and grid pages move on as soon as the sentinel is picked.
            let commit_now = matches!(
                step.kind,
                StepKind::CompactMultiSelect | StepKind::GridMultiSelect
            );
            return PickEffect::Handled { commit_now };
        }
        selection.retain(|s| *s != self.option);
        PickEffect::Continue
    }
}

/// Marketing attribution derived from where the user says they found us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParameters {
    pub utm_source: String,
    pub utm_campaign: String,
    pub utm_content: String,
}

/// source option → (utm_source, utm_campaign, utm_content)
const UTM_TABLE: &[(&str, &str, &str, &str)] = &[
    ("Google Search", "google", "organic_search_2025", "search_results"),
    ("Facebook", "facebook", "social_media_2025", "facebook_post"),
    ("Instagram", "instagram", "social_media_2025", "instagram_story"),
    ("TikTok", "tiktok", "social_media_2025", "tiktok_video"),
    ("YouTube", "youtube", "video_marketing_2025", "youtube_ad"),
    ("Twitter/X", "twitter", "social_media_2025", "twitter_post"),
    ("LinkedIn", "linkedin", "professional_networking_2025", "linkedin_ad"),
    ("Email Newsletter", "email", "email_marketing_2025", "newsletter_signup"),
    ("Friend Referral", "referral", "word_of_mouth_2025", "friend_recommendation"),
    ("Other Website", "referral", "partner_website_2025", "external_link"),
    ("Direct Visit", "direct", "direct_traffic_2025", "bookmark_or_typing"),
];

const UTM_UNKNOWN: (&str, &str, &str) = ("unknown", "unknown_source_2025", "unknown_referral");

/// Look up the UTM triple for a traffic source, falling back to `unknown`.
pub fn utm_for(source: &str) -> UtmParameters {
    let (utm_source, utm_campaign, utm_content) = UTM_TABLE
        .iter()
        .find(|(name, ..)| *name == source)
        .map(|(_, s, c, n)| (*s, *c, *n))
        .unwrap_or(UTM_UNKNOWN);
    UtmParameters {
        utm_source: utm_source.to_string(),
        utm_campaign: utm_campaign.to_string(),
        utm_content: utm_content.to_string(),
    }
}

/// Writes `utm_source`, `utm_campaign` and `utm_content` when the traffic
/// source step is answered.
pub struct TrafficAttribution {
    step_id: String,
}

impl TrafficAttribution {
    pub fn new(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
        }
    }
}

impl StepRule for TrafficAttribution {
    fn name(&self) -> &'static str {
        "traffic_attribution"
    }

    fn applies_to(&self, step: &StepDefinition) -> bool {
        step.id == self.step_id
    }

    fn derive(&self, _step: &StepDefinition, value: &AnswerValue) -> Vec<(String, AnswerValue)> {
        let Some(source) = value.as_text() else {
            return Vec::new();
        };
        let utm = utm_for(source);
        vec![
            ("utm_source".to_string(), AnswerValue::Text(utm.utm_source)),
            ("utm_campaign".to_string(), AnswerValue::Text(utm.utm_campaign)),
            ("utm_content".to_string(), AnswerValue::Text(utm.utm_content)),
        ]
    }
}

/// Ordered set of registered rules.
#[derive(Default)]
pub struct RuleBook {
    rules: Vec<Box<dyn StepRule>>,
}

impl RuleBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules used by the standard catalog.
    pub fn standard() -> Self {
        Self::new()
            .with(ExclusiveOption::new(NONE_OF_THE_ABOVE))
            .with(TrafficAttribution::new(TRAFFIC_SOURCE_STEP))
    }

    pub fn with(mut self, rule: impl StepRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Apply a multi-select pick to `selection`. Returns true when the pick
    /// should commit the step without waiting for the user.
    pub fn toggle(&self, step: &StepDefinition, selection: &mut Vec<String>, option: &str) -> bool {
        for rule in self.rules.iter().filter(|r| r.applies_to(step)) {
            if let PickEffect::Handled { commit_now } = rule.on_pick(step, selection, option) {
                tracing::debug!(rule = rule.name(), step = %step.id, option, "Pick handled by rule");
                return commit_now;
            }
        }
        if let Some(i) = selection.iter().position(|s| s == option) {
            selection.remove(i);
        } else {
            selection.push(option.to_string());
        }
        false
    }

    /// Fields derived from a step's accepted answer, in rule order.
    pub fn derive(&self, step: &StepDefinition, value: &AnswerValue) -> Vec<(String, AnswerValue)> {
        self.rules
            .iter()
            .filter(|r| r.applies_to(step))
            .flat_map(|r| r.derive(step, value))
            .collect()
    }
}

impl std::fmt::Debug for RuleBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::catalog::StepCatalog;

    fn step(id: &str) -> StepDefinition {
        StepCatalog::standard().unwrap().step(id).unwrap().clone()
    }

    fn sel(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_toggle_adds_and_removes() {
        let rules = RuleBook::standard();
        let personality = step("personality");
        let mut selection = Vec::new();

        assert!(!rules.toggle(&personality, &mut selection, "Funny"));
        assert!(!rules.toggle(&personality, &mut selection, "Caring"));
        assert_eq!(selection, sel(&["Funny", "Caring"]));

        rules.toggle(&personality, &mut selection, "Funny");
        assert_eq!(selection, sel(&["Caring"]));
    }

    #[test]
    fn sentinel_clears_every_other_pick() {
        let rules = RuleBook::standard();
        let goals = step("goals");
        let mut selection = sel(&["Friendship", "Marriage"]);

        let commit_now = rules.toggle(&goals, &mut selection, NONE_OF_THE_ABOVE);

        assert!(commit_now);
        assert_eq!(selection, sel(&[NONE_OF_THE_ABOVE]));
    }

    #[test]
    fn sentinel_stays_selected_when_picked_again() {
        let rules = RuleBook::standard();
        let topics = step("topics");
        let mut selection = sel(&[NONE_OF_THE_ABOVE]);
        rules.toggle(&topics, &mut selection, NONE_OF_THE_ABOVE);
        assert_eq!(selection, sel(&[NONE_OF_THE_ABOVE]));
    }

    #[test]
    fn other_pick_removes_active_sentinel() {
        let rules = RuleBook::standard();
        let topics = step("topics");
        let mut selection = sel(&[NONE_OF_THE_ABOVE]);

        let commit_now = rules.toggle(&topics, &mut selection, "Cars");

        assert!(!commit_now);
        assert_eq!(selection, sel(&["Cars"]));
    }

    #[test]
    fn plain_multi_select_sentinel_does_not_commit() {
        let rules = RuleBook::standard();
        let mut plain = step("goals");
        plain.kind = StepKind::MultiSelect;
        let mut selection = sel(&["Friendship"]);

        assert!(!rules.toggle(&plain, &mut selection, NONE_OF_THE_ABOVE));
        assert_eq!(selection, sel(&[NONE_OF_THE_ABOVE]));
    }

    #[test]
    fn exclusive_rule_skips_steps_without_the_option() {
        let rule = ExclusiveOption::new(NONE_OF_THE_ABOVE);
        assert!(rule.applies_to(&step("goals")));
        assert!(!rule.applies_to(&step("interests")));
        assert!(!rule.applies_to(&step("gender")));
    }

    #[test]
    fn every_catalog_source_has_a_mapping() {
        let source_step = step(TRAFFIC_SOURCE_STEP);
        assert_eq!(source_step.options.len(), UTM_TABLE.len());
        for option in &source_step.options {
            assert_ne!(utm_for(option).utm_source, "unknown", "{option} is unmapped");
        }
    }

    #[test]
    fn known_sources_map_deterministically() {
        assert_eq!(
            utm_for("Google Search"),
            UtmParameters {
                utm_source: "google".into(),
                utm_campaign: "organic_search_2025".into(),
                utm_content: "search_results".into(),
            }
        );
        assert_eq!(utm_for("Other Website").utm_source, "referral");
        assert_eq!(utm_for("Direct Visit").utm_content, "bookmark_or_typing");
    }

    #[test]
    fn unknown_source_falls_back() {
        assert_eq!(
            utm_for("Carrier pigeon"),
            UtmParameters {
                utm_source: "unknown".into(),
                utm_campaign: "unknown_source_2025".into(),
                utm_content: "unknown_referral".into(),
            }
        );
    }

    #[test]
    fn derive_only_fires_for_traffic_source() {
        let rules = RuleBook::standard();
        assert!(rules.derive(&step("location"), &"Europe".into()).is_empty());

        let derived = rules.derive(&step(TRAFFIC_SOURCE_STEP), &"LinkedIn".into());
        assert_eq!(derived.len(), 3);
        assert_eq!(derived[0], ("utm_source".to_string(), "linkedin".into()));
    }

    #[test]
    fn empty_rule_book_toggles_only() {
        let rules = RuleBook::new();
        let goals = step("goals");
        let mut selection = sel(&["Friendship"]);
        assert!(!rules.toggle(&goals, &mut selection, NONE_OF_THE_ABOVE));
        assert_eq!(selection, sel(&["Friendship", NONE_OF_THE_ABOVE]));
        assert!(rules.derive(&step(TRAFFIC_SOURCE_STEP), &"TikTok".into()).is_empty());
    }
}
