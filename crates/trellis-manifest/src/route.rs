//! Ingress route for the whole application.
//!
//! Three hosts (site, preview, studio) all terminate at the reverse proxy,
//! which fans out to the serving tiers internally.

use trellis_state::{
    AppInstance, OwnerRef, ResourceBody, ResourceDescriptor, ResourceKind, RouteRule, RouteSpec,
};

use crate::labels::labels_for;
use crate::proxy::PROXY_HTTP_PORT;
use crate::{site_name, studio_site_name};

pub fn route_name(instance: &AppInstance) -> String {
    format!("{}-web", instance.name)
}

pub fn route(instance: &AppInstance) -> ResourceDescriptor {
    let site = site_name(instance);
    let hosts = [
        site.clone(),
        format!("preview.{site}"),
        studio_site_name(instance),
    ];

    ResourceDescriptor {
        kind: ResourceKind::Route,
        name: route_name(instance),
        namespace: instance.namespace.clone(),
        labels: labels_for(instance, "route"),
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Route(RouteSpec {
            rules: hosts
                .into_iter()
                .map(|host| RouteRule {
                    host,
                    endpoint: "proxy".to_string(),
                    port: PROXY_HTTP_PORT,
                })
                .collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_covers_site_preview_and_studio() {
        let mut inst = AppInstance::new("openlearn", "edu1", 1);
        inst.site_name = Some("courses.acme.io".to_string());
        inst.studio_site_name = Some("studio.acme.io".to_string());

        let ResourceBody::Route(spec) = route(&inst).body else {
            panic!("expected route body");
        };
        let hosts: Vec<&str> = spec.rules.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(
            hosts,
            vec!["courses.acme.io", "preview.courses.acme.io", "studio.acme.io"]
        );
        assert!(spec.rules.iter().all(|r| r.endpoint == "proxy" && r.port == 80));
    }
}
