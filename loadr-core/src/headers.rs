use rand::Rng;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("request type selection over an empty label list")]
    EmptyRequestTypes,

    #[error("request type probabilities sum to zero")]
    ZeroProbabilityMass,
}

/// Ordered header map. Wire-level header names are case-insensitive, so
/// lookups compare ASCII-case-insensitively, but the spelling of the first
/// writer is preserved for the result log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert only if the key is not already present. Chain links are applied
    /// innermost-first, so earlier links win conflicting keys and later links
    /// act as defaults.
    pub fn set_default(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.entries.push((name, value.into()));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<(String, String)> {
        self.entries
    }
}

/// One header-contributing link.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderFactory {
    /// Fixed key/value pairs from configuration.
    Static { headers: Vec<(String, String)> },

    /// Independent Bernoulli trial per endpoint; emits the base endpoint and
    /// the comma-joined list of endpoints that passed their trial (possibly
    /// empty).
    Aggregated {
        base_endpoint: String,
        endpoints: Vec<String>,
        probabilities: Vec<f64>,
    },

    /// Draws exactly one label by cumulative selection over a possibly
    /// non-normalized probability vector.
    RequestType {
        request_types: Vec<String>,
        probabilities: Vec<f64>,
    },
}

pub const HEADER_BASE_ENDPOINT: &str = "x-baseendpoint";
pub const HEADER_AGGREGATED_ENDPOINTS: &str = "x-aggregatedendpoints";
pub const HEADER_REQUEST_TYPE: &str = "x-requesttype";

impl HeaderFactory {
    fn contribute(&self, set: &mut HeaderSet, rng: &mut impl Rng) -> Result<()> {
        match self {
            Self::Static { headers } => {
                for (name, value) in headers {
                    set.set_default(name.clone(), value.clone());
                }
            }
            Self::Aggregated {
                base_endpoint,
                endpoints,
                probabilities,
            } => {
                let passed: Vec<&str> = endpoints
                    .iter()
                    .zip(probabilities)
                    .filter(|(_, p)| rng.random_bool(p.clamp(0.0, 1.0)))
                    .map(|(endpoint, _)| endpoint.as_str())
                    .collect();

                set.set_default(HEADER_BASE_ENDPOINT, base_endpoint.clone());
                set.set_default(HEADER_AGGREGATED_ENDPOINTS, passed.join(","));
            }
            Self::RequestType {
                request_types,
                probabilities,
            } => {
                if request_types.is_empty() {
                    return Err(Error::EmptyRequestTypes);
                }

                let total: f64 = probabilities.iter().sum();
                if total <= 0.0 {
                    return Err(Error::ZeroProbabilityMass);
                }

                let draw = rng.random_range(0.0..total);
                let idx = cumulative_pick(probabilities, draw).ok_or(Error::ZeroProbabilityMass)?;
                set.set_default(HEADER_REQUEST_TYPE, request_types[idx].clone());
            }
        }

        Ok(())
    }
}

/// First index whose cumulative interval `[sum(p[..i]), sum(p[..=i]))`
/// contains `draw`.
fn cumulative_pick(probabilities: &[f64], draw: f64) -> Option<usize> {
    let mut acc = 0.0;
    for (idx, p) in probabilities.iter().enumerate() {
        acc += p;
        if draw < acc {
            return Some(idx);
        }
    }

    // Float accumulation can leave the draw on the upper boundary; the last
    // entry with positive mass owns it.
    probabilities.iter().rposition(|p| *p > 0.0)
}

/// Ordered list of header links. `links[0]` is the innermost
/// (first-configured) link and wins conflicting keys; later links only fill
/// keys the earlier ones left absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderChain {
    links: Vec<HeaderFactory>,
}

impl HeaderChain {
    #[must_use]
    pub fn new(links: Vec<HeaderFactory>) -> Self {
        Self { links }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Evaluates the chain innermost-first. The base case (no links) is the
    /// empty header set.
    pub fn build_headers(&self, rng: &mut impl Rng) -> Result<HeaderSet> {
        let mut set = HeaderSet::new();
        for link in &self.links {
            link.contribute(&mut set, rng)?;
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng as _;
    use rand::rngs::StdRng;

    fn static_link(pairs: &[(&str, &str)]) -> HeaderFactory {
        HeaderFactory::Static {
            headers: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn build(chain: &HeaderChain) -> HeaderSet {
        let mut rng = StdRng::seed_from_u64(7);
        match chain.build_headers(&mut rng) {
            Ok(set) => set,
            Err(err) => panic!("chain build failed: {err}"),
        }
    }

    #[test]
    fn empty_chain_builds_empty_set() {
        let set = build(&HeaderChain::default());
        assert!(set.is_empty());
    }

    #[test]
    fn inner_link_wins_conflicting_keys() {
        let chain = HeaderChain::new(vec![
            static_link(&[("x-tenant", "inner"), ("x-only-inner", "kept")]),
            static_link(&[("X-Tenant", "outer"), ("x-only-outer", "default")]),
        ]);

        let set = build(&chain);
        assert_eq!(set.get("x-tenant"), Some("inner"));
        assert_eq!(set.get("x-only-inner"), Some("kept"));
        assert_eq!(set.get("x-only-outer"), Some("default"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn inner_key_survives_any_outer_layering() {
        let chain = HeaderChain::new(vec![
            static_link(&[("x-probe", "innermost")]),
            static_link(&[("x-probe", "middle")]),
            static_link(&[("x-probe", "outermost")]),
        ]);

        let set = build(&chain);
        assert_eq!(set.get("x-probe"), Some("innermost"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn header_lookup_is_case_insensitive_and_case_preserving() {
        let chain = HeaderChain::new(vec![static_link(&[("X-Request-Id", "1")])]);
        let set = build(&chain);
        assert_eq!(set.get("x-request-id"), Some("1"));
        assert_eq!(set.entries()[0].0, "X-Request-Id");

        let spellings: Vec<&str> = set.iter().map(|(k, _)| k).collect();
        assert_eq!(spellings, vec!["X-Request-Id"]);
    }

    #[test]
    fn aggregated_certain_and_impossible_endpoints() {
        let chain = HeaderChain::new(vec![HeaderFactory::Aggregated {
            base_endpoint: "s0".to_string(),
            endpoints: vec!["s1".to_string(), "s2".to_string()],
            probabilities: vec![1.0, 0.0],
        }]);

        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..200 {
            let set = match chain.build_headers(&mut rng) {
                Ok(set) => set,
                Err(err) => panic!("chain build failed: {err}"),
            };
            assert_eq!(set.get(HEADER_BASE_ENDPOINT), Some("s0"));
            assert_eq!(set.get(HEADER_AGGREGATED_ENDPOINTS), Some("s1"));
        }
    }

    #[test]
    fn aggregated_set_can_be_empty() {
        let chain = HeaderChain::new(vec![HeaderFactory::Aggregated {
            base_endpoint: "s0".to_string(),
            endpoints: vec!["s1".to_string()],
            probabilities: vec![0.0],
        }]);

        let set = build(&chain);
        assert_eq!(set.get(HEADER_AGGREGATED_ENDPOINTS), Some(""));
    }

    #[test]
    fn cumulative_pick_follows_the_draw_trace() {
        // Draws 0.1 / 0.5 / 0.9 against [0.3, 0.7] select labels 0, 1, 1.
        let probabilities = [0.3, 0.7];
        assert_eq!(cumulative_pick(&probabilities, 0.1), Some(0));
        assert_eq!(cumulative_pick(&probabilities, 0.5), Some(1));
        assert_eq!(cumulative_pick(&probabilities, 0.9), Some(1));
    }

    #[test]
    fn cumulative_pick_handles_non_normalized_vectors() {
        let probabilities = [3.0, 1.0];
        assert_eq!(cumulative_pick(&probabilities, 2.9), Some(0));
        assert_eq!(cumulative_pick(&probabilities, 3.0), Some(1));
    }

    #[test]
    fn cumulative_pick_boundary_falls_to_last_positive_entry() {
        let probabilities = [0.5, 0.5, 0.0];
        assert_eq!(cumulative_pick(&probabilities, 1.0), Some(1));
    }

    #[test]
    fn request_type_frequency_converges() {
        let chain = HeaderChain::new(vec![HeaderFactory::RequestType {
            request_types: vec!["light".to_string(), "heavy".to_string()],
            probabilities: vec![0.3, 0.7],
        }]);

        let mut rng = StdRng::seed_from_u64(42);
        let trials = 20_000;
        let mut light = 0u32;
        for _ in 0..trials {
            let set = match chain.build_headers(&mut rng) {
                Ok(set) => set,
                Err(err) => panic!("chain build failed: {err}"),
            };
            match set.get(HEADER_REQUEST_TYPE) {
                Some("light") => light += 1,
                Some("heavy") => {}
                other => panic!("unexpected request type: {other:?}"),
            }
        }

        let share = f64::from(light) / f64::from(trials);
        assert!(
            (share - 0.3).abs() < 0.02,
            "light share {share} too far from 0.3"
        );
    }

    #[test]
    fn request_type_rejects_empty_and_zero_mass_vectors() {
        let mut rng = StdRng::seed_from_u64(1);

        let empty = HeaderChain::new(vec![HeaderFactory::RequestType {
            request_types: Vec::new(),
            probabilities: Vec::new(),
        }]);
        assert_eq!(
            empty.build_headers(&mut rng),
            Err(Error::EmptyRequestTypes)
        );

        let zero = HeaderChain::new(vec![HeaderFactory::RequestType {
            request_types: vec!["a".to_string()],
            probabilities: vec![0.0],
        }]);
        assert_eq!(
            zero.build_headers(&mut rng),
            Err(Error::ZeroProbabilityMass)
        );
    }
}
