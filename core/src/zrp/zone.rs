//! Zone routes computed from link state
//!
//! Both zone protocols keep an adjacency view of their link state and
//! derive routes from it with the same bounded breadth-first search. The
//! result is memoized and dropped whenever link state changes.

use crate::net::NetAddress;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Shortest-hop routes from the local node to every node within the radius
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneTable {
    radius: u8,
    /// Hops after the local node, destination last; the local node maps
    /// to an empty route
    routes: BTreeMap<NetAddress, Vec<NetAddress>>,
}

impl ZoneTable {
    /// Breadth-first search from `local` over `links_from`, stopping at
    /// `radius` hops. Neighbours are expanded in address order so ties
    /// between equal-length routes resolve the same way every time.
    pub fn compute<F>(local: NetAddress, radius: u8, links_from: F) -> Self
    where
        F: Fn(&NetAddress) -> Vec<NetAddress>,
    {
        let mut routes = BTreeMap::new();
        routes.insert(local, Vec::new());
        let mut horizon = VecDeque::from([local]);

        while let Some(expand) = horizon.pop_front() {
            let Some(route) = routes.get(&expand).cloned() else {
                continue;
            };
            if route.len() >= radius as usize {
                continue;
            }
            let mut dsts = links_from(&expand);
            dsts.sort_unstable();
            for dst in dsts {
                if routes.contains_key(&dst) {
                    continue;
                }
                let mut to_dst = route.clone();
                to_dst.push(dst);
                routes.insert(dst, to_dst);
                horizon.push_back(dst);
            }
        }

        Self { radius, routes }
    }

    pub fn radius(&self) -> u8 {
        self.radius
    }

    pub fn contains(&self, dst: &NetAddress) -> bool {
        self.routes.contains_key(dst)
    }

    pub fn route(&self, dst: &NetAddress) -> Option<&[NetAddress]> {
        self.routes.get(dst).map(Vec::as_slice)
    }

    /// Number of zone members, the local node included
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Members exactly `radius` hops away
    pub fn periphery(&self) -> Vec<NetAddress> {
        self.routes
            .iter()
            .filter(|(_, route)| route.len() == self.radius as usize)
            .map(|(dst, _)| *dst)
            .collect()
    }
}

/// Every node within `depth` hops of `src`, `src` included
pub fn coverage<F>(src: NetAddress, depth: u8, links_from: F) -> BTreeSet<NetAddress>
where
    F: Fn(&NetAddress) -> Vec<NetAddress>,
{
    let mut cover = BTreeSet::from([src]);
    let mut horizon = vec![src];
    for _ in 0..depth {
        let mut next = Vec::new();
        for expand in horizon {
            for dst in links_from(&expand) {
                if cover.insert(dst) {
                    next.push(dst);
                }
            }
        }
        horizon = next;
    }
    cover
}

/// For every node within `radius` hops of `local`, the set of neighbours
/// through which it is reachable over a shortest path
pub fn closest_neighbours<F>(
    local: NetAddress,
    radius: u8,
    links_from: F,
) -> BTreeMap<NetAddress, BTreeSet<NetAddress>>
where
    F: Fn(&NetAddress) -> Vec<NetAddress>,
{
    let mut closest: BTreeMap<NetAddress, BTreeSet<NetAddress>> = BTreeMap::new();
    let mut inside = BTreeSet::from([local]);
    let mut horizon = Vec::new();
    for n in links_from(&local) {
        if n != local && closest.insert(n, BTreeSet::from([n])).is_none() {
            horizon.push(n);
        }
    }

    for _ in 1..radius {
        inside.extend(horizon.iter().copied());
        let mut next = Vec::new();
        for src in &horizon {
            let via = closest.get(src).cloned().unwrap_or_default();
            for dst in links_from(src) {
                if inside.contains(&dst) {
                    continue;
                }
                let entry = closest.entry(dst).or_insert_with(|| {
                    next.push(dst);
                    BTreeSet::new()
                });
                entry.extend(via.iter().copied());
            }
        }
        horizon = next;
    }
    closest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u32) -> NetAddress {
        NetAddress::from_index(n)
    }

    /// Undirected adjacency from an edge list
    fn graph(edges: &[(u32, u32)]) -> BTreeMap<NetAddress, Vec<NetAddress>> {
        let mut adj: BTreeMap<NetAddress, Vec<NetAddress>> = BTreeMap::new();
        for &(a, b) in edges {
            adj.entry(addr(a)).or_default().push(addr(b));
            adj.entry(addr(b)).or_default().push(addr(a));
        }
        adj
    }

    fn links(adj: &BTreeMap<NetAddress, Vec<NetAddress>>) -> impl Fn(&NetAddress) -> Vec<NetAddress> + '_ {
        move |src| adj.get(src).cloned().unwrap_or_default()
    }

    #[test]
    fn test_zone_bounded_by_radius() {
        let adj = graph(&[(1, 2), (2, 3), (3, 4)]);
        let zone = ZoneTable::compute(addr(1), 2, links(&adj));

        assert_eq!(zone.route(&addr(1)), Some(&[][..]));
        assert_eq!(zone.route(&addr(2)), Some(&[addr(2)][..]));
        assert_eq!(zone.route(&addr(3)), Some(&[addr(2), addr(3)][..]));
        assert!(!zone.contains(&addr(4)));
        assert_eq!(zone.periphery(), vec![addr(3)]);
        assert_eq!(zone.len(), 3);
    }

    #[test]
    fn test_zone_prefers_shortest_then_lowest() {
        // 1-2-4 and 1-3-4, plus a long way round 1-5-6-4
        let adj = graph(&[(1, 3), (1, 2), (2, 4), (3, 4), (1, 5), (5, 6), (6, 4)]);
        let zone = ZoneTable::compute(addr(1), 3, links(&adj));
        assert_eq!(zone.route(&addr(4)), Some(&[addr(2), addr(4)][..]));
    }

    #[test]
    fn test_coverage_depth() {
        let adj = graph(&[(1, 2), (2, 3), (3, 4)]);
        let cover = coverage(addr(2), 1, links(&adj));
        assert_eq!(cover, BTreeSet::from([addr(1), addr(2), addr(3)]));
        assert_eq!(coverage(addr(2), 0, links(&adj)), BTreeSet::from([addr(2)]));
    }

    #[test]
    fn test_closest_neighbours_merges_equal_paths() {
        // 4 is two hops away through both 2 and 3
        let adj = graph(&[(1, 2), (1, 3), (2, 4), (3, 4), (3, 5)]);
        let closest = closest_neighbours(addr(1), 2, links(&adj));
        assert_eq!(closest[&addr(4)], BTreeSet::from([addr(2), addr(3)]));
        assert_eq!(closest[&addr(5)], BTreeSet::from([addr(3)]));
        assert_eq!(closest[&addr(2)], BTreeSet::from([addr(2)]));
        assert!(!closest.contains_key(&addr(1)));
    }
}
