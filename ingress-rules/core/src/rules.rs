//! Edits to an ingress's ordered rule list.
//!
//! Rule and path order is significant to whatever routes traffic for the
//! ingress, so every edit leaves unrelated rules and paths in place.

use ingress_rules_k8s_api::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, ResourceExt, Service, ServiceBackendPort,
};
use serde::Serialize;
use tracing::trace;

const PATH_TYPE: &str = "ImplementationSpecific";

/// Locates a path within an ingress's rules.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    #[serde(rename = "ruleIndex")]
    pub rule: usize,
    #[serde(rename = "pathIndex")]
    pub path: usize,
}

/// The service port a path routes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Backend {
    pub service: String,
    pub port: i32,
}

// === impl Backend ===

impl Backend {
    /// Routes to the service's first declared port. Returns `None` if the
    /// service declares no ports.
    pub fn for_service(service: &Service) -> Option<Self> {
        let port = service
            .spec
            .as_ref()?
            .ports
            .as_ref()?
            .first()
            .map(|p| p.port)?;
        Some(Self {
            service: service.name_any(),
            port,
        })
    }

    fn to_path(&self) -> HTTPIngressPath {
        HTTPIngressPath {
            backend: IngressBackend {
                service: Some(IngressServiceBackend {
                    name: self.service.clone(),
                    port: Some(ServiceBackendPort {
                        number: Some(self.port),
                        name: None,
                    }),
                }),
                resource: None,
            },
            path: None,
            path_type: PATH_TYPE.to_string(),
        }
    }
}

/// Returns the first position whose rule matches `host` and whose backend
/// is `service`.
pub fn find_position(ingress: &Ingress, service: &str, host: &str) -> Option<Position> {
    positions(ingress, service, host).next()
}

/// Returns every position, in rule and path order, whose rule matches
/// `host` and whose backend is `service`.
pub fn positions<'i>(
    ingress: &'i Ingress,
    service: &'i str,
    host: &'i str,
) -> impl Iterator<Item = Position> + 'i {
    rules(ingress)
        .iter()
        .enumerate()
        .filter(move |(_, rule)| rule.host.as_deref() == Some(host))
        .flat_map(move |(r, rule)| {
            paths(rule)
                .iter()
                .enumerate()
                .filter(move |(_, path)| backend_service(path) == Some(service))
                .map(move |(p, _)| Position { rule: r, path: p })
        })
}

/// Adds a path routing `host` to `backend`.
///
/// The path joins the first rule for `host`; a new rule is appended only when
/// no rule for the host exists. Returns false, leaving the ingress untouched,
/// if the backend is already routed under `host`.
pub fn add_path(ingress: &mut Ingress, host: &str, backend: &Backend) -> bool {
    if find_position(ingress, &backend.service, host).is_some() {
        trace!(service = %backend.service, %host, "Path already present");
        return false;
    }

    let rules = ingress
        .spec
        .get_or_insert_with(Default::default)
        .rules
        .get_or_insert_with(Vec::new);

    match rules
        .iter_mut()
        .enumerate()
        .find(|(_, rule)| rule.host.as_deref() == Some(host))
    {
        Some((i, rule)) => {
            trace!(rule = i, %host, service = %backend.service, "Merging path into rule");
            rule.http
                .get_or_insert_with(Default::default)
                .paths
                .push(backend.to_path());
        }
        None => {
            trace!(rule = rules.len(), %host, service = %backend.service, "Appending rule");
            rules.push(IngressRule {
                host: Some(host.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![backend.to_path()],
                }),
            });
        }
    }
    true
}

/// Removes every path routing `host` to `service`, dropping every rule for
/// `host` that is left without paths. Returns the number of paths removed.
pub fn remove_paths(ingress: &mut Ingress, host: &str, service: &str) -> usize {
    let Some(rules) = ingress.spec.as_mut().and_then(|s| s.rules.as_mut()) else {
        return 0;
    };

    let mut removed = 0;
    rules.retain_mut(|rule| {
        if rule.host.as_deref() != Some(host) {
            return true;
        }
        let Some(http) = rule.http.as_mut() else {
            trace!(%host, "Dropping rule without paths");
            return false;
        };

        let before = http.paths.len();
        http.paths.retain(|path| backend_service(path) != Some(service));
        let dropped = before - http.paths.len();
        removed += dropped;
        trace!(%host, %service, dropped, remaining = http.paths.len(), "Filtered rule");

        !http.paths.is_empty()
    });
    removed
}

fn rules(ingress: &Ingress) -> &[IngressRule] {
    ingress
        .spec
        .as_ref()
        .and_then(|s| s.rules.as_deref())
        .unwrap_or_default()
}

fn paths(rule: &IngressRule) -> &[HTTPIngressPath] {
    rule.http
        .as_ref()
        .map(|h| h.paths.as_slice())
        .unwrap_or_default()
}

fn backend_service(path: &HTTPIngressPath) -> Option<&str> {
    path.backend.service.as_ref().map(|s| s.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_rules_k8s_api::{IngressSpec, ObjectMeta, ServicePort, ServiceSpec};
    use pretty_assertions::assert_eq;

    fn mk_ingress(rules: Vec<(&str, Vec<&str>)>) -> Ingress {
        let mut ingress = Ingress {
            metadata: ObjectMeta {
                namespace: Some("default".to_string()),
                name: Some("public".to_string()),
                ..Default::default()
            },
            spec: Some(IngressSpec::default()),
            ..Default::default()
        };
        ingress.spec.as_mut().unwrap().rules = Some(
            rules
                .into_iter()
                .map(|(host, services)| IngressRule {
                    host: Some(host.to_string()),
                    http: Some(HTTPIngressRuleValue {
                        paths: services
                            .into_iter()
                            .map(|s| {
                                Backend {
                                    service: s.to_string(),
                                    port: 80,
                                }
                                .to_path()
                            })
                            .collect(),
                    }),
                })
                .collect(),
        );
        ingress
    }

    /// Flattens an ingress into `host: service,service` lines.
    fn summarize(ingress: &Ingress) -> Vec<String> {
        rules(ingress)
            .iter()
            .map(|rule| {
                let services = paths(rule)
                    .iter()
                    .filter_map(backend_service)
                    .collect::<Vec<_>>();
                format!(
                    "{}: {}",
                    rule.host.as_deref().unwrap_or_default(),
                    services.join(",")
                )
            })
            .collect()
    }

    fn backend(service: &str) -> Backend {
        Backend {
            service: service.to_string(),
            port: 80,
        }
    }

    #[test]
    fn find_position_matches_host_and_service() {
        let ingress = mk_ingress(vec![
            ("a.example.com", vec!["echo"]),
            ("b.example.com", vec!["web", "echo"]),
        ]);
        assert_eq!(
            find_position(&ingress, "echo", "b.example.com"),
            Some(Position { rule: 1, path: 1 })
        );
        assert_eq!(
            find_position(&ingress, "echo", "a.example.com"),
            Some(Position { rule: 0, path: 0 })
        );
        assert_eq!(find_position(&ingress, "web", "a.example.com"), None);
        assert_eq!(find_position(&ingress, "echo", "*.example.com"), None);
    }

    #[test]
    fn positions_spans_duplicate_host_rules() {
        let ingress = mk_ingress(vec![
            ("a.example.com", vec!["web"]),
            ("a.example.com", vec!["echo"]),
            ("a.example.com", vec!["echo", "web"]),
        ]);
        assert_eq!(
            positions(&ingress, "echo", "a.example.com").collect::<Vec<_>>(),
            vec![Position { rule: 1, path: 0 }, Position { rule: 2, path: 0 }]
        );
    }

    #[test]
    fn add_path_to_empty_ingress() {
        let mut ingress = Ingress::default();
        assert!(add_path(&mut ingress, "echo.example.com", &backend("echo")));

        let rules = rules(&ingress);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].host.as_deref(), Some("echo.example.com"));
        let paths = paths(&rules[0]);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].path_type, PATH_TYPE);
        assert_eq!(
            paths[0].backend.service,
            Some(IngressServiceBackend {
                name: "echo".to_string(),
                port: Some(ServiceBackendPort {
                    number: Some(80),
                    name: None,
                }),
            })
        );
    }

    #[test]
    fn add_path_merges_into_existing_host() {
        let mut ingress = mk_ingress(vec![
            ("a.example.com", vec!["web"]),
            ("b.example.com", vec!["api"]),
            ("a.example.com", vec!["other"]),
        ]);
        assert!(add_path(&mut ingress, "a.example.com", &backend("echo")));
        assert_eq!(
            summarize(&ingress),
            vec![
                "a.example.com: web,echo",
                "b.example.com: api",
                "a.example.com: other",
            ]
        );
    }

    #[test]
    fn add_path_appends_new_host() {
        let mut ingress = mk_ingress(vec![("a.example.com", vec!["web"])]);
        assert!(add_path(&mut ingress, "b.example.com", &backend("echo")));
        assert_eq!(
            summarize(&ingress),
            vec!["a.example.com: web", "b.example.com: echo"]
        );
    }

    #[test]
    fn add_path_is_idempotent() {
        let mut ingress = mk_ingress(vec![("a.example.com", vec!["echo"])]);
        let before = ingress.clone();
        assert!(!add_path(&mut ingress, "a.example.com", &backend("echo")));
        assert_eq!(ingress, before);
    }

    #[test]
    fn remove_last_path_drops_rule() {
        let mut ingress = mk_ingress(vec![
            ("a.example.com", vec!["web"]),
            ("echo.example.com", vec!["echo"]),
            ("b.example.com", vec!["api"]),
        ]);
        assert_eq!(remove_paths(&mut ingress, "echo.example.com", "echo"), 1);
        assert_eq!(
            summarize(&ingress),
            vec!["a.example.com: web", "b.example.com: api"]
        );
    }

    #[test]
    fn remove_path_keeps_siblings_in_order() {
        let mut ingress = mk_ingress(vec![("a.example.com", vec!["web", "echo", "api"])]);
        assert_eq!(remove_paths(&mut ingress, "a.example.com", "echo"), 1);
        assert_eq!(summarize(&ingress), vec!["a.example.com: web,api"]);
    }

    #[test]
    fn remove_ignores_other_hosts() {
        let mut ingress = mk_ingress(vec![
            ("a.example.com", vec!["echo"]),
            ("b.example.com", vec!["echo"]),
        ]);
        assert_eq!(remove_paths(&mut ingress, "b.example.com", "echo"), 1);
        assert_eq!(summarize(&ingress), vec!["a.example.com: echo"]);
    }

    #[test]
    fn remove_spans_duplicate_host_rules() {
        let mut ingress = mk_ingress(vec![
            ("a.example.com", vec!["echo"]),
            ("a.example.com", vec!["web", "echo"]),
        ]);
        assert_eq!(remove_paths(&mut ingress, "a.example.com", "echo"), 2);
        assert_eq!(summarize(&ingress), vec!["a.example.com: web"]);
    }

    #[test]
    fn remove_drops_empty_rules_for_host() {
        let mut ingress = mk_ingress(vec![
            ("echo.example.com", vec![]),
            ("a.example.com", vec![]),
            ("echo.example.com", vec!["echo"]),
        ]);
        assert_eq!(remove_paths(&mut ingress, "echo.example.com", "echo"), 1);
        assert_eq!(summarize(&ingress), vec!["a.example.com: "]);
    }

    #[test]
    fn remove_drops_rules_for_host_without_http() {
        let mut ingress = mk_ingress(vec![
            ("echo.example.com", vec!["echo"]),
            ("a.example.com", vec!["web"]),
        ]);
        if let Some(rules) = ingress.spec.as_mut().and_then(|s| s.rules.as_mut()) {
            rules.push(IngressRule {
                host: Some("echo.example.com".to_string()),
                http: None,
            });
        }
        assert_eq!(remove_paths(&mut ingress, "echo.example.com", "echo"), 1);
        assert_eq!(summarize(&ingress), vec!["a.example.com: web"]);
    }

    #[test]
    fn backend_uses_first_port() {
        let service = Service {
            metadata: ObjectMeta {
                name: Some("echo".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![
                    ServicePort {
                        port: 80,
                        ..Default::default()
                    },
                    ServicePort {
                        port: 443,
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(Backend::for_service(&service), Some(backend("echo")));

        let portless = Service {
            spec: Some(ServiceSpec::default()),
            ..service
        };
        assert_eq!(Backend::for_service(&portless), None);
    }
}
