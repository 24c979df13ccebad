//! Workload input: request files and synthetic generators.
//!
//! Request files are flat comma-separated `type,key,args` triples, several
//! per line if desired; the numeric type field uses the wire discriminants.
//! The generators produce reproducible synthetic streams for benches, tests
//! and the `--initial-keys` pre-population path.

use crate::shared::protocol::{ClientMessage, Key, RequestType, TEMPLATE_VALUE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Binomial, Distribution};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("cannot read request file: {0}")]
    Io(#[from] std::io::Error),

    #[error("request file line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Loads a request file. Request ids are assigned in file order.
pub fn load_requests(path: impl AsRef<Path>) -> Result<Vec<ClientMessage>, WorkloadError> {
    let content = std::fs::read_to_string(path)?;
    let mut requests = Vec::new();

    for (line_index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields: Vec<&str> = line.split(',').collect();
        // A comma after the last triple leaves a stray empty field behind; an
        // empty third field is a legitimate empty args, so only drop the
        // stray one.
        if fields.len() % 3 == 1 && fields.last() == Some(&"") {
            fields.pop();
        }
        if fields.len() % 3 != 0 {
            return Err(WorkloadError::Parse {
                line: line_index + 1,
                message: format!("expected type,key,args triples, got {} fields", fields.len()),
            });
        }

        for triple in fields.chunks_exact(3) {
            let parse_error = |message: String| WorkloadError::Parse {
                line: line_index + 1,
                message,
            };

            let raw_kind: i32 = triple[0]
                .trim()
                .parse()
                .map_err(|_| parse_error(format!("bad request type {:?}", triple[0])))?;
            let kind = RequestType::from_wire(raw_kind)
                .ok_or_else(|| parse_error(format!("unknown request type {raw_kind}")))?;
            let key: Key = triple[1]
                .trim()
                .parse()
                .map_err(|_| parse_error(format!("bad key {:?}", triple[1])))?;

            let id = requests.len() as i32;
            requests.push(ClientMessage::new(id, kind, key, triple[2]));
        }
    }

    Ok(requests)
}

/// Key selection for synthetic workloads.
#[derive(Debug, Clone, Copy)]
pub enum KeyDistribution {
    Fixed(Key),
    Uniform { min: Key, max: Key },
    /// Binomial over `[0, n]`; concentrates traffic around `n·p`, which is
    /// what makes repartitioning visible in benches.
    Binomial { n: u64, p: f64 },
}

impl KeyDistribution {
    fn sample(&self, rng: &mut StdRng) -> Key {
        match *self {
            KeyDistribution::Fixed(key) => key,
            KeyDistribution::Uniform { min, max } => rng.gen_range(min..=max),
            KeyDistribution::Binomial { n, p } => {
                let distribution = Binomial::new(n, p).unwrap_or_else(|_| {
                    Binomial::new(n, 0.5).expect("p = 0.5 is always valid")
                });
                distribution.sample(rng) as Key
            }
        }
    }
}

/// Shape of a synthetic request stream.
#[derive(Debug, Clone)]
pub struct WorkloadSpec {
    pub n_requests: usize,
    /// Fraction of requests that are WRITEs; the remainder splits between
    /// READs and SCANs.
    pub write_ratio: f64,
    pub scan_ratio: f64,
    pub scan_length: usize,
    pub keys: KeyDistribution,
    pub seed: u64,
}

/// Generates a reproducible request stream: the same spec always yields the
/// same messages.
pub fn generate_requests(spec: &WorkloadSpec) -> Vec<ClientMessage> {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let mut requests = Vec::with_capacity(spec.n_requests);

    for id in 0..spec.n_requests {
        let key = spec.keys.sample(&mut rng);
        let roll: f64 = rng.gen();

        let message = if roll < spec.write_ratio {
            ClientMessage::new(id as i32, RequestType::Write, key, format!("value-{id}"))
        } else if roll < spec.write_ratio + spec.scan_ratio {
            ClientMessage::new(
                id as i32,
                RequestType::Scan,
                key,
                spec.scan_length.to_string(),
            )
        } else {
            ClientMessage::new(id as i32, RequestType::Read, key, "")
        };
        requests.push(message);
    }

    requests
}

/// WRITEs that pre-create keys `[0, n)` with the template value, admitted
/// before live traffic when `--initial-keys` is set.
pub fn initial_load(n_keys: usize) -> Vec<ClientMessage> {
    (0..n_keys)
        .map(|key| {
            ClientMessage::new(key as i32, RequestType::Write, key as Key, TEMPLATE_VALUE)
        })
        .collect()
}
