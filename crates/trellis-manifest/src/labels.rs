//! Label schema for managed resources.
//!
//! Labels are the only selection mechanism the substrate offers, so the
//! schema is explicit and versioned rather than assembled ad hoc at each
//! call site. Endpoint selectors reuse the same schema, which is what ties
//! an endpoint to its workload's pods.

use std::collections::BTreeMap;

use trellis_state::AppInstance;

/// Name of the application every resource belongs to.
pub const APP_NAME: &str = "openlearn";

/// Version of the label schema itself. Bump when keys change meaning.
pub const LABEL_SCHEMA_VERSION: &str = "v1";

/// Build the label set for one tier of one instance.
pub fn labels_for(instance: &AppInstance, tier: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), APP_NAME.to_string()),
        ("instance".to_string(), instance.name.clone()),
        ("tier".to_string(), tier.to_string()),
        ("part-of".to_string(), APP_NAME.to_string()),
        ("managed-by".to_string(), "trellis".to_string()),
        (
            "schema-version".to_string(),
            LABEL_SCHEMA_VERSION.to_string(),
        ),
    ])
}
