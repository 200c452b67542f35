//! Admission webhook configuration comparison
//!
//! The CA bundle in each client config is injected after creation by the
//! certificate issuer and is never compared.

use k8s_openapi::api::admissionregistration::v1::{
    MatchCondition, MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations,
    ServiceReference, ValidatingWebhook, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use super::{
    first_drift, keyed_set_matches, opt_matches, selectors_equal, slice, Comparable, Comparator,
    Drift,
};

const DEFAULT_SERVICE_PORT: i32 = 443;
const DEFAULT_SCOPE: &str = "*";

/// Shared view over validating and mutating webhooks
trait Webhook {
    fn name(&self) -> &str;
    fn client_config(&self) -> &WebhookClientConfig;
    fn rules(&self) -> &[RuleWithOperations];
    fn namespace_selector(&self) -> Option<&LabelSelector>;
    fn object_selector(&self) -> Option<&LabelSelector>;
    fn side_effects(&self) -> &str;
    fn admission_review_versions(&self) -> &[String];
    fn failure_policy(&self) -> &Option<String>;
    fn match_policy(&self) -> &Option<String>;
    fn timeout_seconds(&self) -> &Option<i32>;
    fn match_conditions(&self) -> &Option<Vec<MatchCondition>>;

    fn reinvocation_policy(&self) -> &Option<String> {
        &None
    }
}

macro_rules! webhook_accessors {
    () => {
        fn name(&self) -> &str {
            &self.name
        }
        fn client_config(&self) -> &WebhookClientConfig {
            &self.client_config
        }
        fn rules(&self) -> &[RuleWithOperations] {
            slice(&self.rules)
        }
        fn namespace_selector(&self) -> Option<&LabelSelector> {
            self.namespace_selector.as_ref()
        }
        fn object_selector(&self) -> Option<&LabelSelector> {
            self.object_selector.as_ref()
        }
        fn side_effects(&self) -> &str {
            &self.side_effects
        }
        fn admission_review_versions(&self) -> &[String] {
            &self.admission_review_versions
        }
        fn failure_policy(&self) -> &Option<String> {
            &self.failure_policy
        }
        fn match_policy(&self) -> &Option<String> {
            &self.match_policy
        }
        fn timeout_seconds(&self) -> &Option<i32> {
            &self.timeout_seconds
        }
        fn match_conditions(&self) -> &Option<Vec<MatchCondition>> {
            &self.match_conditions
        }
    };
}

impl Webhook for ValidatingWebhook {
    webhook_accessors!();
}

impl Webhook for MutatingWebhook {
    webhook_accessors!();

    fn reinvocation_policy(&self) -> &Option<String> {
        &self.reinvocation_policy
    }
}

fn service_matches(desired: &ServiceReference, observed: &ServiceReference) -> bool {
    desired.name == observed.name
        && desired.namespace == observed.namespace
        && desired.path == observed.path
        && desired.port.unwrap_or(DEFAULT_SERVICE_PORT)
            == observed.port.unwrap_or(DEFAULT_SERVICE_PORT)
}

fn client_config_matches(desired: &WebhookClientConfig, observed: &WebhookClientConfig) -> bool {
    let services = match (&desired.service, &observed.service) {
        (None, None) => true,
        (Some(d), Some(o)) => service_matches(d, o),
        _ => false,
    };
    services && desired.url == observed.url
}

fn rule_matches(desired: &RuleWithOperations, observed: &RuleWithOperations) -> bool {
    desired.api_groups == observed.api_groups
        && desired.api_versions == observed.api_versions
        && desired.operations == observed.operations
        && desired.resources == observed.resources
        && desired.scope.as_deref().unwrap_or(DEFAULT_SCOPE)
            == observed.scope.as_deref().unwrap_or(DEFAULT_SCOPE)
}

fn rules_match(desired: &[RuleWithOperations], observed: &[RuleWithOperations]) -> bool {
    desired.len() == observed.len()
        && desired.iter().zip(observed).all(|(d, o)| rule_matches(d, o))
}

fn webhook_matches<W: Webhook>(desired: &W, observed: &W) -> bool {
    first_webhook_drift(desired, observed).is_none()
}

fn first_webhook_drift<W: Webhook>(desired: &W, observed: &W) -> Option<Drift> {
    first_drift([
        (
            client_config_matches(desired.client_config(), observed.client_config()),
            "clientConfig",
        ),
        (rules_match(desired.rules(), observed.rules()), "rules"),
        (
            selectors_equal(desired.namespace_selector(), observed.namespace_selector()),
            "namespaceSelector",
        ),
        (
            selectors_equal(desired.object_selector(), observed.object_selector()),
            "objectSelector",
        ),
        (desired.side_effects() == observed.side_effects(), "sideEffects"),
        (
            desired.admission_review_versions() == observed.admission_review_versions(),
            "admissionReviewVersions",
        ),
        (opt_matches(desired.failure_policy(), observed.failure_policy()), "failurePolicy"),
        (opt_matches(desired.match_policy(), observed.match_policy()), "matchPolicy"),
        (opt_matches(desired.timeout_seconds(), observed.timeout_seconds()), "timeoutSeconds"),
        (
            opt_matches(desired.match_conditions(), observed.match_conditions()),
            "matchConditions",
        ),
        (
            opt_matches(desired.reinvocation_policy(), observed.reinvocation_policy()),
            "reinvocationPolicy",
        ),
    ])
}

fn webhooks_drift<W: Webhook>(desired: &[W], observed: &[W]) -> Option<Drift> {
    if keyed_set_matches(desired, observed, |w| w.name().to_string(), webhook_matches::<W>) {
        return None;
    }
    // Name the first offending webhook for the debug log
    let field = desired
        .iter()
        .find_map(|d| match observed.iter().find(|o| o.name() == d.name()) {
            None => Some(format!("webhooks[{}]", d.name())),
            Some(o) => first_webhook_drift(d, o)
                .map(|drift| format!("webhooks[{}].{}", d.name(), drift)),
        })
        .unwrap_or_else(|| "webhooks".to_string());
    Some(Drift::at_path(field))
}

impl Comparable for ValidatingWebhookConfiguration {
    fn spec_drift(&self, desired: &Self, _cmp: &Comparator) -> Option<Drift> {
        webhooks_drift(slice(&desired.webhooks), slice(&self.webhooks))
    }
}

impl Comparable for MutatingWebhookConfiguration {
    fn spec_drift(&self, desired: &Self, _cmp: &Comparator) -> Option<Drift> {
        webhooks_drift(slice(&desired.webhooks), slice(&self.webhooks))
    }
}
