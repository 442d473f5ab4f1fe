//! Placement filters.
//!
//! A filter narrows the candidate agent set for one launch batch; the
//! chain is applied in order and short-circuits once it runs dry.

use std::sync::Arc;

use crate::agent::Agent;
use crate::task::{Constraint, ConstraintOp, TaskConfig};

pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    fn filter(&self, cfg: &TaskConfig, agents: Vec<Arc<Agent>>) -> Vec<Arc<Agent>>;
}

/// Run the chain over a snapshot of the registry.
pub fn apply_filters(
    filters: &[Box<dyn Filter>],
    cfg: &TaskConfig,
    mut agents: Vec<Arc<Agent>>,
) -> Vec<Arc<Agent>> {
    for filter in filters {
        if agents.is_empty() {
            break;
        }
        agents = filter.filter(cfg, agents);
    }
    agents
}

/// Keeps agents whose aggregated offers satisfy the task's cpus, mem,
/// disk and (when any networking port is needed) at least one port.
pub struct ResourceFilter;

impl Filter for ResourceFilter {
    fn name(&self) -> &str {
        "resource"
    }

    fn filter(&self, cfg: &TaskConfig, agents: Vec<Arc<Agent>>) -> Vec<Arc<Agent>> {
        agents
            .into_iter()
            .filter(|agent| {
                let (cpus, mem, disk, ports) = agent.resources();
                cpus >= cfg.cpus && mem >= cfg.mem && disk >= cfg.disk && !ports.is_empty()
            })
            .collect()
    }
}

/// Keeps agents matching every attribute constraint on the config.
pub struct ConstraintFilter;

impl Filter for ConstraintFilter {
    fn name(&self) -> &str {
        "constraint"
    }

    fn filter(&self, cfg: &TaskConfig, agents: Vec<Arc<Agent>>) -> Vec<Arc<Agent>> {
        if cfg.constraints.is_empty() {
            return agents;
        }

        agents
            .into_iter()
            .filter(|agent| {
                let attrs = agent.attributes();
                cfg.constraints
                    .iter()
                    .all(|c| constraint_matches(c, &attrs, agent.hostname()))
            })
            .collect()
    }
}

fn constraint_matches(
    constraint: &Constraint,
    attrs: &std::collections::HashMap<String, String>,
    hostname: &str,
) -> bool {
    // `hostname` is matchable like any attribute.
    let actual = if constraint.attribute == "hostname" {
        Some(hostname.to_string())
    } else {
        attrs.get(&constraint.attribute).cloned()
    };

    match constraint.op {
        ConstraintOp::Exists => actual.is_some(),
        ConstraintOp::Eq => actual.as_deref() == constraint.value.as_deref(),
        ConstraintOp::Ne => actual.is_some() && actual.as_deref() != constraint.value.as_deref(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::events::{Id, Range, Ranges, Resource, Scalar};
    use crate::offer::Offer;

    fn agent_with_offer(id: &str, cpus: f64, mem: f64, with_ports: bool) -> Arc<Agent> {
        let mut resources = vec![
            Resource {
                name: "cpus".to_string(),
                kind: Some("SCALAR".to_string()),
                scalar: Some(Scalar { value: cpus }),
                ranges: None,
            },
            Resource {
                name: "mem".to_string(),
                kind: Some("SCALAR".to_string()),
                scalar: Some(Scalar { value: mem }),
                ranges: None,
            },
        ];
        if with_ports {
            resources.push(Resource {
                name: "ports".to_string(),
                kind: Some("RANGES".to_string()),
                scalar: None,
                ranges: Some(Ranges {
                    range: vec![Range {
                        begin: 31000,
                        end: 31009,
                    }],
                }),
            });
        }

        let agent = Agent::new(id, &format!("host-{id}"), HashMap::new());
        agent.add_offer(Arc::new(Offer::from_wire(&crate::events::Offer {
            id: Id::new(format!("offer-{id}")),
            agent_id: Id::new(id),
            hostname: format!("host-{id}"),
            resources,
            attributes: vec![],
        })));
        agent
    }

    fn cfg(cpus: f64, mem: f64) -> TaskConfig {
        TaskConfig {
            cpus,
            mem,
            ..TaskConfig::default()
        }
    }

    #[test]
    fn test_resource_filter_thresholds() {
        let agents = vec![
            agent_with_offer("a1", 4.0, 1024.0, true),
            agent_with_offer("a2", 0.5, 1024.0, true),
            agent_with_offer("a3", 4.0, 128.0, true),
        ];

        let kept = ResourceFilter.filter(&cfg(1.0, 256.0), agents);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id(), "a1");
    }

    #[test]
    fn test_resource_filter_requires_ports() {
        let agents = vec![agent_with_offer("a1", 4.0, 1024.0, false)];
        assert!(ResourceFilter.filter(&cfg(1.0, 256.0), agents).is_empty());
    }

    #[test]
    fn test_constraint_filter() {
        let with_rack = Agent::new(
            "a1",
            "host-a1",
            HashMap::from([("rack".to_string(), "r1".to_string())]),
        );
        let without = Agent::new("a2", "host-a2", HashMap::new());

        let mut config = cfg(0.0, 0.0);
        config.constraints = vec![Constraint {
            attribute: "rack".to_string(),
            op: ConstraintOp::Eq,
            value: Some("r1".to_string()),
        }];

        let kept = ConstraintFilter.filter(&config, vec![with_rack, without]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id(), "a1");
    }

    #[test]
    fn test_constraint_on_hostname() {
        let agent = Agent::new("a1", "node-7", HashMap::new());
        let mut config = cfg(0.0, 0.0);
        config.constraints = vec![Constraint {
            attribute: "hostname".to_string(),
            op: ConstraintOp::Ne,
            value: Some("node-9".to_string()),
        }];

        assert_eq!(ConstraintFilter.filter(&config, vec![agent]).len(), 1);
    }

    #[test]
    fn test_chain_short_circuits() {
        let filters: Vec<Box<dyn Filter>> =
            vec![Box::new(ResourceFilter), Box::new(ConstraintFilter)];
        let agents = vec![agent_with_offer("a1", 0.1, 16.0, true)];
        assert!(apply_filters(&filters, &cfg(8.0, 4096.0), agents).is_empty());
    }
}
