//! Step catalog: the static, ordered definition of every wizard step.

use serde::{Deserialize, Serialize};

use crate::error::WizardError;

/// Option that clears every other pick on multi-select steps.
pub const NONE_OF_THE_ABOVE: &str = "None of the above";

/// Step whose answer drives UTM attribution.
pub const TRAFFIC_SOURCE_STEP: &str = "traffic_source";

/// Input shape of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    InformationalDisplay,
    SingleChoice,
    MultiSelect,
    CompactMultiSelect,
    GridMultiSelect,
    FreeText,
    EmailInput,
    AgeGate,
    GenderChoice,
    ComputedTransition,
}

impl StepKind {
    /// Kinds answered by picking exactly one option.
    pub fn is_single_choice(&self) -> bool {
        matches!(self, Self::SingleChoice | Self::GenderChoice | Self::AgeGate)
    }

    /// Kinds answered by an ordered list of options.
    pub fn is_multi_select(&self) -> bool {
        matches!(
            self,
            Self::MultiSelect | Self::CompactMultiSelect | Self::GridMultiSelect
        )
    }

    /// Kinds answered by typed text.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::FreeText | Self::EmailInput)
    }

    /// Kinds that carry no answer and advance on a proceed signal.
    pub fn is_passive(&self) -> bool {
        matches!(self, Self::InformationalDisplay | Self::ComputedTransition)
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InformationalDisplay => "informational_display",
            Self::SingleChoice => "single_choice",
            Self::MultiSelect => "multi_select",
            Self::CompactMultiSelect => "compact_multi_select",
            Self::GridMultiSelect => "grid_multi_select",
            Self::FreeText => "free_text",
            Self::EmailInput => "email_input",
            Self::AgeGate => "age_gate",
            Self::GenderChoice => "gender_choice",
            Self::ComputedTransition => "computed_transition",
        };
        write!(f, "{s}")
    }
}

/// One screen of the wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Stable key; doubles as the answer field name.
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: StepKind,
    /// Present only for choice kinds.
    #[serde(default)]
    pub options: Vec<String>,
    pub required: bool,
    /// Message surfaced when the step is committed without an answer.
    pub empty_message: String,
    /// For age gates: the option that is selectable but never accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underage_option: Option<String>,
}

impl StepDefinition {
    pub fn new(id: &str, title: &str, kind: StepKind) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            kind,
            options: Vec::new(),
            required: !kind.is_passive(),
            empty_message: default_empty_message(kind).to_string(),
            underage_option: None,
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn when_empty(mut self, message: &str) -> Self {
        self.empty_message = message.to_string();
        self
    }

    pub fn underage(mut self, option: &str) -> Self {
        self.underage_option = Some(option.to_string());
        self
    }

    /// Whether `option` is one of this step's choices.
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

fn default_empty_message(kind: StepKind) -> &'static str {
    match kind {
        StepKind::MultiSelect | StepKind::CompactMultiSelect | StepKind::GridMultiSelect => {
            "Please select at least one option"
        }
        StepKind::FreeText => "Please fill in this field",
        StepKind::EmailInput => "Please enter a valid email address",
        StepKind::SingleChoice | StepKind::AgeGate | StepKind::GenderChoice => {
            "Please select an option"
        }
        StepKind::InformationalDisplay | StepKind::ComputedTransition => "",
    }
}

/// Load-once, read-only ordered list of steps.
#[derive(Debug, Clone)]
pub struct StepCatalog {
    steps: Vec<StepDefinition>,
}

impl StepCatalog {
    /// Build a catalog, rejecting duplicate step ids.
    pub fn new(steps: Vec<StepDefinition>) -> Result<Self, WizardError> {
        for (i, step) in steps.iter().enumerate() {
            if steps[..i].iter().any(|s| s.id == step.id) {
                return Err(WizardError::DuplicateStep(step.id.clone()));
            }
        }
        Ok(Self { steps })
    }

    /// Number of steps. Fixed for the lifetime of the catalog.
    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// Step at a 1-based position.
    pub fn step_at(&self, position: usize) -> Result<&StepDefinition, WizardError> {
        position
            .checked_sub(1)
            .and_then(|i| self.steps.get(i))
            .ok_or(WizardError::OutOfRange {
                position,
                total: self.steps.len(),
            })
    }

    /// 1-based position of a step id.
    pub fn position_of(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id).map(|i| i + 1)
    }

    /// Look up a step by id.
    pub fn step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// The production dating-survey catalog.
    pub fn standard() -> Result<Self, WizardError> {
        use StepKind::*;

        let steps = vec![
            StepDefinition::new("welcome", "Welcome to SoulMatch", InformationalDisplay)
                .describe("Find your perfect match in just a few minutes"),
            StepDefinition::new("gender", "THE joy of connection ON SoulMatch", GenderChoice)
                .describe("Based on your experience")
                .options(&["Man", "Woman"])
                .when_empty("Please select your gender"),
            StepDefinition::new(
                "stats",
                "Over 9,108,000 people have already chosen our platform",
                InformationalDisplay,
            )
            .describe("Join thousands of successful matches every day"),
            StepDefinition::new(
                "dating_experience",
                "Have you ever tried online dating before?",
                SingleChoice,
            )
            .describe("This helps us personalize your experience")
            .options(&[
                "Yes, I have experience",
                "No, this is my first time",
                "I've tried but had no luck",
            ]),
            StepDefinition::new("goals", "What are you looking for?", CompactMultiSelect)
                .describe("Select all that apply to you")
                .options(&[
                    "Serious relationship",
                    "Casual dating",
                    "Friendship",
                    "Marriage",
                    "Just exploring",
                    NONE_OF_THE_ABOVE,
                ]),
            StepDefinition::new(
                "personality",
                "How would you describe yourself?",
                CompactMultiSelect,
            )
            .describe("Choose the traits that best represent you")
            .options(&[
                "Adventurous",
                "Romantic",
                "Funny",
                "Intellectual",
                "Creative",
                "Athletic",
                "Caring",
                "Ambitious",
            ])
            .when_empty("Please select at least one trait"),
            StepDefinition::new(
                "interests",
                "What are your main interests?",
                CompactMultiSelect,
            )
            .describe("This helps us find people with similar hobbies")
            .options(&[
                "Music & Concerts",
                "Sports & Fitness",
                "Travel & Adventure",
                "Art & Culture",
                "Technology",
                "Cooking & Food",
                "Books & Reading",
                "Movies & TV Shows",
            ])
            .when_empty("Please select at least one interest"),
            StepDefinition::new(
                "topics",
                "What topics would you love to discuss?",
                GridMultiSelect,
            )
            .describe("Select the topics that interest you most")
            .options(&["Books", "Cars", "Politics", "Sports", NONE_OF_THE_ABOVE]),
            StepDefinition::new("lifestyle", "Tell us about your lifestyle", SingleChoice)
                .describe("How do you like to spend your free time?")
                .options(&[
                    "I love going out and socializing",
                    "I prefer quiet evenings at home",
                    "I'm always up for new adventures",
                    "I enjoy a mix of both",
                ])
                .when_empty("Please select a lifestyle option"),
            StepDefinition::new("hair_color", "What's your hair color?", SingleChoice)
                .describe("Help others recognize you")
                .options(&["Black", "Brown", "Blonde", "Red", "Gray", "Other"])
                .when_empty("Please select a hair color"),
            StepDefinition::new("age_preference", "What age range interests you?", SingleChoice)
                .describe("This helps us show you relevant matches")
                .options(&[
                    "Same age as me",
                    "A few years younger",
                    "A few years older",
                    "Much younger",
                    "Much older",
                    "Age doesn't matter",
                ])
                .when_empty("Please select an age preference"),
            StepDefinition::new("age", "How old are you?", AgeGate)
                .describe(
                    "By clicking the button below, you approve that you are at least 18 or adult age in your country.",
                )
                .options(&[
                    "Under 18",
                    "Age 18-34",
                    "Age 35-44",
                    "Age 45-54",
                    "Age 55-64",
                    "Age 65+",
                ])
                .underage("Under 18")
                .when_empty("Please select your age range"),
            StepDefinition::new("location", "Where are you located?", SingleChoice)
                .describe("We'll help you find matches nearby")
                .options(&[
                    "North America",
                    "Europe",
                    "Asia",
                    "South America",
                    "Africa",
                    "Australia",
                    "Other",
                ])
                .when_empty("Please select your location"),
            StepDefinition::new(
                TRAFFIC_SOURCE_STEP,
                "Where did you find SoulMatch?",
                SingleChoice,
            )
            .describe("This helps us understand how people discover our platform")
            .options(&[
                "Google Search",
                "Facebook",
                "Instagram",
                "TikTok",
                "YouTube",
                "Twitter/X",
                "LinkedIn",
                "Email Newsletter",
                "Friend Referral",
                "Other Website",
                "Direct Visit",
            ]),
            StepDefinition::new("analyzing", "Finding your perfect matches...", ComputedTransition)
                .describe("Our AI is analyzing your preferences to find the best connections"),
            StepDefinition::new("name", "What should we call you?", FreeText)
                .describe("This is how others will see you on the platform")
                .when_empty("Please enter your name"),
            StepDefinition::new("email", "Almost done! Just need your email", EmailInput)
                .describe("We'll send you a verification link to complete your registration"),
            StepDefinition::new("success", "Welcome to SoulMatch!", InformationalDisplay)
                .describe("Your profile is being created. Check your email for verification."),
        ];

        Self::new(steps)
    }
}
