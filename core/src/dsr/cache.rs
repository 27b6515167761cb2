//! Route cache: candidate hop lists per destination, shortest first

use crate::net::NetAddress;
use std::collections::BTreeMap;

/// Routes from this node, keyed by destination. A route lists the
/// intermediate hops only: neither this node nor the destination appear.
#[derive(Debug, Default, Clone)]
pub struct RouteCache {
    routes: BTreeMap<NetAddress, Vec<Vec<NetAddress>>>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping routes ordered by length. Equal-length routes keep
    /// arrival order; an exact duplicate is not inserted.
    ///
    /// Returns whether the cache changed.
    pub fn insert(&mut self, dest: NetAddress, route: Vec<NetAddress>) -> bool {
        let routes = self.routes.entry(dest).or_default();
        if routes.iter().any(|r| *r == route) {
            return false;
        }
        let at = routes
            .iter()
            .position(|r| r.len() > route.len())
            .unwrap_or(routes.len());
        routes.insert(at, route);
        true
    }

    /// Shortest known route to `dest`
    pub fn shortest(&self, dest: &NetAddress) -> Option<&[NetAddress]> {
        self.routes
            .get(dest)
            .and_then(|routes| routes.first())
            .map(Vec::as_slice)
    }

    pub fn routes(&self, dest: &NetAddress) -> &[Vec<NetAddress>] {
        self.routes.get(dest).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, dest: &NetAddress) -> bool {
        self.shortest(dest).is_some()
    }

    /// Purge every route, to any destination, that uses the link `a -> b`.
    /// `local` is this node, the implicit start of every route.
    ///
    /// Returns the number of routes removed.
    pub fn remove_link(&mut self, local: NetAddress, a: NetAddress, b: NetAddress) -> usize {
        let mut removed = 0;
        for (dest, routes) in self.routes.iter_mut() {
            let before = routes.len();
            routes.retain(|route| !uses_link(local, *dest, route, a, b));
            removed += before - routes.len();
        }
        self.routes.retain(|_, routes| !routes.is_empty());
        removed
    }

    /// Number of destinations with at least one route
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn uses_link(
    local: NetAddress,
    dest: NetAddress,
    route: &[NetAddress],
    a: NetAddress,
    b: NetAddress,
) -> bool {
    let first = route.first().copied().unwrap_or(dest);
    let last = route.last().copied().unwrap_or(local);
    (a == local && b == first)
        || (b == dest && a == last)
        || route.windows(2).any(|w| w[0] == a && w[1] == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(n: u32) -> NetAddress {
        NetAddress::from_index(n)
    }

    fn route(ids: &[u32]) -> Vec<NetAddress> {
        ids.iter().map(|&n| addr(n)).collect()
    }

    #[test]
    fn test_insert_orders_by_length() {
        let mut cache = RouteCache::new();
        let dest = addr(9);
        cache.insert(dest, route(&[1, 2, 3]));
        cache.insert(dest, route(&[4]));
        cache.insert(dest, route(&[5, 6]));

        let lens: Vec<usize> = cache.routes(&dest).iter().map(Vec::len).collect();
        assert_eq!(lens, vec![1, 2, 3]);
        assert_eq!(cache.shortest(&dest), Some(route(&[4]).as_slice()));
    }

    #[test]
    fn test_duplicate_not_inserted() {
        let mut cache = RouteCache::new();
        let dest = addr(9);
        assert!(cache.insert(dest, route(&[1, 2])));
        assert!(!cache.insert(dest, route(&[1, 2])));
        assert!(cache.insert(dest, route(&[3, 4])));
        assert_eq!(cache.routes(&dest), &[route(&[1, 2]), route(&[3, 4])]);
    }

    #[test]
    fn test_direct_neighbour_route_is_empty() {
        let mut cache = RouteCache::new();
        cache.insert(addr(2), vec![]);
        assert_eq!(cache.shortest(&addr(2)), Some(&[][..]));
        assert!(cache.contains(&addr(2)));
        assert!(!cache.contains(&addr(3)));
    }

    #[test]
    fn test_remove_link_first_hop() {
        let local = addr(1);
        let mut cache = RouteCache::new();
        cache.insert(addr(4), route(&[2, 3]));
        cache.insert(addr(2), vec![]);
        cache.insert(addr(4), route(&[5, 3]));

        assert_eq!(cache.remove_link(local, local, addr(2)), 2);
        assert_eq!(cache.routes(&addr(4)), &[route(&[5, 3])]);
        assert!(!cache.contains(&addr(2)));
    }

    #[test]
    fn test_remove_link_middle_and_last() {
        let local = addr(1);
        let mut cache = RouteCache::new();
        cache.insert(addr(4), route(&[2, 3]));
        cache.insert(addr(3), route(&[2]));
        cache.insert(addr(5), route(&[2, 3, 4]));

        // 2 -> 3 is a middle link for 4 and 5, the last link for 3
        assert_eq!(cache.remove_link(local, addr(2), addr(3)), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_link_is_directional() {
        let local = addr(1);
        let mut cache = RouteCache::new();
        cache.insert(addr(4), route(&[2, 3]));
        assert_eq!(cache.remove_link(local, addr(3), addr(2)), 0);
        assert_eq!(cache.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_routes_stay_sorted(lens in proptest::collection::vec(0usize..8, 1..20)) {
            let mut cache = RouteCache::new();
            let dest = addr(1000);
            for (i, len) in lens.iter().enumerate() {
                let hops: Vec<NetAddress> =
                    (0..*len).map(|h| addr(10 + (i * 8 + h) as u32)).collect();
                cache.insert(dest, hops);
            }
            let got: Vec<usize> = cache.routes(&dest).iter().map(Vec::len).collect();
            let mut sorted = got.clone();
            sorted.sort_unstable();
            prop_assert_eq!(got, sorted);
        }
    }
}
