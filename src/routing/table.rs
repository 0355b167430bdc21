use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

use crate::http::request::Method;
use crate::ratelimit::LeakyBucket;
use crate::routing::endpoint::Endpoint;
use crate::routing::route::split_segments;

/// A successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Position of the endpoint in table order
    pub index: usize,
    pub path_variables: HashMap<String, String>,
    pub wildcard: Option<String>,
}

/// Endpoints ordered most specific first, fixed at construction.
///
/// Lookups walk the table in order and take the first endpoint whose method
/// and route both match. Endpoints of equal specificity keep their
/// registration order.
#[derive(Debug)]
pub struct RouteTable {
    endpoints: Vec<Endpoint>,
}

impl RouteTable {
    pub fn new(mut endpoints: Vec<Endpoint>) -> Self {
        // Stable sort: ties stay in registration order.
        endpoints.sort_by(|a, b| a.route.specificity_cmp(&b.route));
        Self { endpoints }
    }

    /// Matches `path` against the table; a query suffix is ignored.
    ///
    /// `None` covers both an unknown path and a known path registered under
    /// a different method.
    pub fn try_match(&self, method: Method, path: &str) -> Option<RouteMatch> {
        let path = path.split_once('?').map_or(path, |(path, _)| path);
        let segments: Vec<&str> = split_segments(path).collect();

        self.endpoints
            .iter()
            .enumerate()
            .filter(|(_, ep)| ep.method == method)
            .find_map(|(index, ep)| {
                ep.route.matches(&segments).map(|captures| RouteMatch {
                    index,
                    path_variables: captures.variables,
                    wildcard: captures.remainder,
                })
            })
    }

    pub fn get(&self, index: usize) -> Option<&Endpoint> {
        self.endpoints.get(index)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    /// Buckets of every rate-limited endpoint, for the leak driver.
    pub fn buckets(&self) -> Vec<Arc<LeakyBucket>> {
        self.endpoints
            .iter()
            .filter_map(|ep| ep.bucket.clone())
            .collect()
    }
}

impl Index<usize> for RouteTable {
    type Output = Endpoint;

    fn index(&self, index: usize) -> &Endpoint {
        &self.endpoints[index]
    }
}
