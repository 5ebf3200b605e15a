//! Desired state: which shows a provider should list, and what each listing says.
//!
//! Everything here is pure; the reconciler feeds it rows it has already loaded.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::adapters::EventPayload;
use crate::models::production::Model as ProductionModel;
use crate::models::show::Model as ShowModel;
use crate::models::show_rule::{Model as ShowRuleModel, RuleType};
use crate::models::ticketing_setup::{ListingMode, Model as SetupModel};

/// Used when neither the setup nor an override names a title template.
pub const DEFAULT_TITLE_TEMPLATE: &str = "{production}";

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{(production|date|time|venue)\}").expect("placeholder pattern is valid")
    })
}

/// Show ids that should be listed on `provider_id`.
///
/// Starts from the listing mode, adds `include` rules, removes `exclude` rules.
/// Rules scoped to other providers are ignored; cancelled shows never qualify.
pub fn should_list_ids(
    setup: &SetupModel,
    shows: &[ShowModel],
    rules: &[ShowRuleModel],
    provider_id: Uuid,
    now: DateTime<Utc>,
) -> BTreeSet<Uuid> {
    let listable: BTreeSet<Uuid> = shows
        .iter()
        .filter(|show| !show.is_cancelled())
        .map(|show| show.id)
        .collect();

    let applicable = || {
        rules
            .iter()
            .filter(move |rule| rule.applies_to(provider_id))
    };

    let mut selected: BTreeSet<Uuid> = match setup.listing_mode {
        ListingMode::AllShows => listable.clone(),
        ListingMode::FutureOnly => shows
            .iter()
            .filter(|show| !show.is_cancelled() && show.starts_at.with_timezone(&Utc) > now)
            .map(|show| show.id)
            .collect(),
        ListingMode::Selected => BTreeSet::new(),
    };

    selected.extend(
        applicable()
            .filter(|rule| rule.rule_type == RuleType::Include)
            .map(|rule| rule.show_id)
            .filter(|id| listable.contains(id)),
    );

    for rule in applicable().filter(|rule| rule.rule_type == RuleType::Exclude) {
        selected.remove(&rule.show_id);
    }

    selected
}

/// Overrides carried by provider setups and `override` show rules. Every field
/// is optional; later layers win.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadOverrides {
    pub title: Option<String>,
    pub title_template: Option<String>,
    pub description: Option<String>,
    pub description_template: Option<String>,
    pub capacity: Option<i32>,
    pub pricing_tiers: Option<JsonValue>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
}

impl PayloadOverrides {
    /// Parses a stored overrides object. Unreadable overrides are ignored.
    pub fn from_json(value: Option<&JsonValue>) -> Self {
        match value {
            None | Some(JsonValue::Null) => Self::default(),
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|err| {
                warn!(error = %err, "Ignoring unreadable payload overrides");
                Self::default()
            }),
        }
    }

    /// Layers `other` on top of `self`.
    pub fn merged_with(mut self, other: PayloadOverrides) -> Self {
        macro_rules! layer {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        layer!(
            title,
            title_template,
            description,
            description_template,
            capacity,
            pricing_tiers,
            venue_name,
            venue_address
        );
        self
    }
}

/// Override rules for `show_id` that apply to `provider_id`, unscoped rules
/// first so provider-scoped ones win.
pub fn show_overrides(rules: &[ShowRuleModel], show_id: Uuid, provider_id: Uuid) -> PayloadOverrides {
    let mut matching: Vec<&ShowRuleModel> = rules
        .iter()
        .filter(|rule| {
            rule.rule_type == RuleType::Override
                && rule.show_id == show_id
                && rule.applies_to(provider_id)
        })
        .collect();
    matching.sort_by_key(|rule| (rule.provider_ids.is_some(), rule.created_at));

    matching
        .into_iter()
        .fold(PayloadOverrides::default(), |acc, rule| {
            acc.merged_with(PayloadOverrides::from_json(rule.overrides.as_ref()))
        })
}

/// Everything about a listing that does not vary per show.
#[derive(Debug, Clone)]
pub struct PayloadContext<'a> {
    pub production: &'a ProductionModel,
    pub setup: &'a SetupModel,
    pub provider_overrides: &'a PayloadOverrides,
    pub image_base_url: Option<&'a str>,
}

impl PayloadContext<'_> {
    /// Builds the payload for `show`. Precedence, lowest first: setup, provider
    /// setup overrides, show rule overrides.
    pub fn build(
        &self,
        show: &ShowModel,
        show_overrides: &PayloadOverrides,
        parent_external_id: Option<String>,
    ) -> EventPayload {
        let layered = self
            .provider_overrides
            .clone()
            .merged_with(show_overrides.clone());

        let venue_name = layered
            .venue_name
            .clone()
            .or_else(|| show.venue_name.clone())
            .or_else(|| self.setup.default_venue_name.clone());
        let venue_address = layered
            .venue_address
            .clone()
            .or_else(|| show.venue_address.clone())
            .or_else(|| self.setup.default_venue_address.clone());

        let vars = TemplateVars {
            production: &self.production.title,
            starts_at: show.starts_at.with_timezone(&Utc),
            venue: venue_name.as_deref().unwrap_or_default(),
        };

        let title = match layered.title.clone() {
            Some(title) => title,
            None => {
                let template = layered
                    .title_template
                    .as_deref()
                    .or(self.setup.title_template.as_deref())
                    .unwrap_or(DEFAULT_TITLE_TEMPLATE);
                render_template(template, &vars)
            }
        };

        let description = match layered.description.clone() {
            Some(description) => Some(description),
            None => layered
                .description_template
                .as_deref()
                .or(self.setup.description_template.as_deref())
                .map(|template| render_template(template, &vars))
                .or_else(|| self.production.description.clone()),
        };

        EventPayload {
            show_id: show.id,
            title,
            description,
            starts_at: show.starts_at.with_timezone(&Utc),
            ends_at: show.ends_at.map(|t| t.with_timezone(&Utc)),
            venue_name,
            venue_address,
            capacity: layered.capacity.or(show.capacity),
            pricing_tiers: layered
                .pricing_tiers
                .clone()
                .or_else(|| self.setup.pricing_tiers.clone()),
            image_url: image_url(self.image_base_url, self.production.image_key.as_deref()),
            parent_external_id,
        }
    }
}

pub struct TemplateVars<'a> {
    pub production: &'a str,
    pub starts_at: DateTime<Utc>,
    pub venue: &'a str,
}

/// Substitutes `{production}`, `{date}`, `{time}` and `{venue}`. Unknown
/// placeholders are left as written.
pub fn render_template(template: &str, vars: &TemplateVars<'_>) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "production" => vars.production.to_string(),
            "date" => vars.starts_at.format("%a %b %-d, %Y").to_string(),
            "time" => vars.starts_at.format("%-I:%M %p").to_string(),
            "venue" => vars.venue.to_string(),
            other => format!("{{{other}}}"),
        })
        .trim()
        .to_string()
}

pub fn image_url(base: Option<&str>, image_key: Option<&str>) -> Option<String> {
    let key = image_key.filter(|k| !k.is_empty())?;
    if key.starts_with("http://") || key.starts_with("https://") {
        return Some(key.to_string());
    }
    let base = base?;
    Some(format!(
        "{}/{}",
        base.trim_end_matches('/'),
        key.trim_start_matches('/')
    ))
}

/// Stable digest of a payload; a changed hash means the listing needs an update.
pub fn content_hash(payload: &EventPayload) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}
