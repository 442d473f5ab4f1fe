//! Registry snapshot of a resource offer.
//!
//! Offers are decoded once when they arrive and stored immutably on their
//! agent until launch-accept, rescind or decline consumes them.

use std::collections::HashMap;

use serde_json::json;

use crate::events;

/// A snapshot of one offer's resources.
#[derive(Debug, Clone)]
pub struct Offer {
    id: String,
    agent_id: String,
    hostname: String,
    cpus: f64,
    mem: f64,
    disk: f64,
    port_ranges: Vec<(u64, u64)>,
    attrs: HashMap<String, String>,
}

impl Offer {
    /// Flatten a wire offer into its scalar sums and port ranges.
    pub fn from_wire(wire: &events::Offer) -> Self {
        let mut cpus = 0.0;
        let mut mem = 0.0;
        let mut disk = 0.0;
        let mut port_ranges = Vec::new();

        for resource in &wire.resources {
            match resource.name.as_str() {
                "cpus" => cpus += resource.scalar.map_or(0.0, |s| s.value),
                "mem" => mem += resource.scalar.map_or(0.0, |s| s.value),
                "disk" => disk += resource.scalar.map_or(0.0, |s| s.value),
                "ports" => {
                    if let Some(ranges) = &resource.ranges {
                        port_ranges.extend(ranges.range.iter().map(|r| (r.begin, r.end)));
                    }
                }
                _ => {}
            }
        }

        let attrs = wire
            .attributes
            .iter()
            .map(|a| (a.name.clone(), a.value_string()))
            .collect();

        Self {
            id: wire.id.value.clone(),
            agent_id: wire.agent_id.value.clone(),
            hostname: wire.hostname.clone(),
            cpus,
            mem,
            disk,
            port_ranges,
            attrs,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn cpus(&self) -> f64 {
        self.cpus
    }

    pub fn mem(&self) -> f64 {
        self.mem
    }

    pub fn disk(&self) -> f64 {
        self.disk
    }

    pub fn port_ranges(&self) -> &[(u64, u64)] {
        &self.port_ranges
    }

    /// Port ranges expanded to individual ports, in range order.
    pub fn ports(&self) -> Vec<u64> {
        self.port_ranges
            .iter()
            .flat_map(|&(begin, end)| begin..=end)
            .collect()
    }

    pub fn attrs(&self) -> &HashMap<String, String> {
        &self.attrs
    }

    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "id": &self.id,
            "agent_id": &self.agent_id,
            "hostname": &self.hostname,
            "cpus": self.cpus,
            "mem": self.mem,
            "disk": self.disk,
            "ports": self.port_ranges.iter()
                .map(|(b, e)| format!("{b}-{e}"))
                .collect::<Vec<_>>(),
            "attributes": &self.attrs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Id, Ranges, Range, Resource, Scalar};

    fn wire_offer() -> events::Offer {
        events::Offer {
            id: Id::new("o1"),
            agent_id: Id::new("a1"),
            hostname: "node-1".to_string(),
            resources: vec![
                Resource {
                    name: "cpus".to_string(),
                    kind: Some("SCALAR".to_string()),
                    scalar: Some(Scalar { value: 4.0 }),
                    ranges: None,
                },
                Resource {
                    name: "mem".to_string(),
                    kind: Some("SCALAR".to_string()),
                    scalar: Some(Scalar { value: 1024.0 }),
                    ranges: None,
                },
                Resource {
                    name: "ports".to_string(),
                    kind: Some("RANGES".to_string()),
                    scalar: None,
                    ranges: Some(Ranges {
                        range: vec![
                            Range {
                                begin: 31000,
                                end: 31002,
                            },
                            Range {
                                begin: 32000,
                                end: 32000,
                            },
                        ],
                    }),
                },
            ],
            attributes: vec![],
        }
    }

    #[test]
    fn test_from_wire_sums_scalars() {
        let offer = Offer::from_wire(&wire_offer());
        assert_eq!(offer.cpus(), 4.0);
        assert_eq!(offer.mem(), 1024.0);
        assert_eq!(offer.disk(), 0.0);
        assert_eq!(offer.hostname(), "node-1");
    }

    #[test]
    fn test_ports_expansion_preserves_order() {
        let offer = Offer::from_wire(&wire_offer());
        assert_eq!(offer.ports(), vec![31000, 31001, 31002, 32000]);
    }
}
