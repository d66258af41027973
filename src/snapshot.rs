use crate::model::{Group, Point, Population};
use serde::{Deserialize, Serialize};

/// Boundary representation of one agent: `(x, y, type)`.
///
/// Renderers index these positionally, so the tuple layout is fixed.
pub type Triple = (f64, f64, bool);

/// Position and group of one agent at an iteration boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Site {
    pub pos: Point,
    pub group: Group,
}

/// State of the whole population at one iteration boundary, in agent order.
///
/// Serializes as a sequence of [`Triple`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Triple>", into = "Vec<Triple>")]
pub struct Snapshot {
    sites: Vec<Site>,
}

impl Snapshot {
    pub fn capture(population: &Population) -> Self {
        let sites = population
            .agents()
            .iter()
            .map(|agt| Site {
                pos: agt.pos(),
                group: agt.group(),
            })
            .collect();
        Self { sites }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn positions(&self) -> Vec<Point> {
        self.sites.iter().map(|site| site.pos).collect()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.sites.iter().map(|site| site.group).collect()
    }

    pub fn triples(&self) -> impl Iterator<Item = Triple> + '_ {
        self.sites
            .iter()
            .map(|site| (site.pos.x, site.pos.y, site.group.as_bool()))
    }

    /// Number of agents in each group, `(A, B)`.
    pub fn group_counts(&self) -> (usize, usize) {
        let n_a = self
            .sites
            .iter()
            .filter(|site| site.group == Group::A)
            .count();
        (n_a, self.sites.len() - n_a)
    }
}

impl From<Vec<Triple>> for Snapshot {
    fn from(triples: Vec<Triple>) -> Self {
        let sites = triples
            .into_iter()
            .map(|(x, y, flag)| Site {
                pos: Point::new(x, y),
                group: Group::from_bool(flag),
            })
            .collect();
        Self { sites }
    }
}

impl From<Snapshot> for Vec<Triple> {
    fn from(snapshot: Snapshot) -> Self {
        snapshot.triples().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Agent;

    #[test]
    fn serializes_as_positional_triples() {
        let population = Population::new(vec![
            Agent::new(Point::new(0.25, 0.5), Group::A),
            Agent::new(Point::new(0.75, 0.125), Group::B),
        ]);
        let snapshot = Snapshot::capture(&population);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, "[[0.25,0.5,false],[0.75,0.125,true]]");

        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.group_counts(), (1, 1));
    }
}
