//! trellis-manifest: per-tier resource descriptor builders.
//!
//! Every function in this crate is pure: given an [`AppInstance`], it
//! returns an in-memory [`ResourceDescriptor`] for one managed resource.
//! No I/O, no caching: descriptors are rebuilt fresh on every reconcile
//! pass and the ensure primitive decides whether anything is created.
//!
//! All builders attach the instance's owner back-reference and the
//! versioned label set from [`labels`].
//!
//! Claims, bundles, and endpoints carry tier-scoped names, not
//! instance-scoped ones, so a namespace hosts at most one instance.
//! The daemon's `apply` command enforces this.
//!
//! [`AppInstance`]: trellis_state::AppInstance
//! [`ResourceDescriptor`]: trellis_state::ResourceDescriptor

pub mod bundles;
pub mod claims;
pub mod labels;
pub mod mongo;
pub mod mysql;
pub mod proxy;
pub mod redis;
pub mod route;
pub mod tasks;
pub mod web;
pub mod worker;

use trellis_state::AppInstance;

/// Application image shared by the web tier, worker tier, and init tasks.
pub const PLATFORM_IMAGE: &str = "docker.io/openlearn/platform:2.4.1";

/// Default site hostname when the instance carries no override.
pub const DEFAULT_SITE_NAME: &str = "learn.example.com";

/// Default authoring-site hostname when the instance carries no override.
pub const DEFAULT_STUDIO_SITE_NAME: &str = "studio.learn.example.com";

/// Default display title when the instance carries no override.
pub const DEFAULT_TITLE: &str = "Open Learning";

/// Workloads and tasks are prefixed with the instance name; shared
/// resources (claims, bundles, endpoints) keep the bare tier name.
pub fn workload_name(instance: &AppInstance, tier: &str) -> String {
    format!("{}-{}", instance.name, tier)
}

/// Site hostname for the web tier, honoring the instance override.
pub fn site_name(instance: &AppInstance) -> String {
    instance
        .site_name
        .clone()
        .unwrap_or_else(|| DEFAULT_SITE_NAME.to_string())
}

/// Site hostname for the authoring tier, honoring the instance override.
pub fn studio_site_name(instance: &AppInstance) -> String {
    instance
        .studio_site_name
        .clone()
        .unwrap_or_else(|| DEFAULT_STUDIO_SITE_NAME.to_string())
}

/// Display title, honoring the instance override.
pub fn title(instance: &AppInstance) -> String {
    instance
        .title
        .clone()
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workload_names_are_instance_prefixed() {
        let inst = AppInstance::new("openlearn", "edu1", 1);
        assert_eq!(workload_name(&inst, "mysql"), "edu1-mysql");
        assert_eq!(workload_name(&inst, "web"), "edu1-web");
    }

    #[test]
    fn site_names_fall_back_to_defaults() {
        let mut inst = AppInstance::new("openlearn", "edu1", 1);
        assert_eq!(site_name(&inst), DEFAULT_SITE_NAME);
        assert_eq!(studio_site_name(&inst), DEFAULT_STUDIO_SITE_NAME);
        assert_eq!(title(&inst), DEFAULT_TITLE);

        inst.site_name = Some("courses.acme.io".to_string());
        assert_eq!(site_name(&inst), "courses.acme.io");
    }
}
