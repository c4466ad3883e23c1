//! Reachability walk over the directory tree.

use core::fmt;

use clustervfs::{ClusterId, FsResult, METADATA_SIZE, ROOT_CLUSTER};
use log::debug;

use crate::fat::ClusterStatus;
use crate::handler::HandlerFactory;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Entries reached from the root, root included.
    pub entries: u64,
    pub reachable_clusters: u64,
    /// Allocated clusters no live chain owns.
    pub leaked: Vec<ClusterId>,
    pub problems: Vec<String>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.leaked.is_empty() && self.problems.is_empty()
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} entries, {} clusters reachable",
            self.entries, self.reachable_clusters
        )?;
        if !self.leaked.is_empty() {
            writeln!(f, "leaked clusters: {:?}", self.leaked)?;
        }
        for problem in &self.problems {
            writeln!(f, "problem: {problem}")?;
        }
        if self.is_clean() {
            writeln!(f, "image is consistent")?;
        }
        Ok(())
    }
}

pub fn run(factory: &HandlerFactory) -> FsResult<CheckReport> {
    let fat = factory.fat();
    let cluster_size = factory.settings().cluster_size;
    let mut report = CheckReport::default();
    let mut owner: Vec<Option<ClusterId>> = vec![None; fat.entries_count() as usize];
    let mut pending = vec![(ROOT_CLUSTER, ROOT_CLUSTER)];

    while let Some((first, parent)) = pending.pop() {
        let chain = match fat.chain(first) {
            Ok(chain) => chain,
            Err(err) => {
                report.problems.push(format!("chain {first}: {err}"));
                continue;
            }
        };
        let mut shared = false;
        for &cluster in &chain {
            match owner[cluster as usize] {
                Some(other) => {
                    report.problems.push(format!(
                        "cluster {cluster} is claimed by chains {other} and {first}"
                    ));
                    shared = true;
                }
                None => owner[cluster as usize] = Some(first),
            }
        }
        if shared {
            continue;
        }
        report.entries += 1;
        report.reachable_clusters += chain.len() as u64;

        let meta = match factory.metadata(first) {
            Ok(meta) => meta,
            Err(err) => {
                report.problems.push(format!("header of {first}: {err}"));
                continue;
            }
        };
        if meta.parent_first_cluster != parent {
            report.problems.push(format!(
                "{first} (`{}`) names parent {} but is listed under {parent}",
                meta.name, meta.parent_first_cluster
            ));
        }
        if METADATA_SIZE as u64 + meta.size > chain.len() as u64 * cluster_size {
            report.problems.push(format!(
                "{first} (`{}`) claims {} bytes but its chain is {} clusters long",
                meta.name,
                meta.size,
                chain.len()
            ));
            continue;
        }
        if meta.is_directory {
            match factory.read_directory(first) {
                Ok(dir) => pending.extend(dir.children().iter().map(|&child| (child, first))),
                Err(err) => report.problems.push(format!("directory {first}: {err}")),
            }
        }
    }

    for (index, entry) in fat.entries()?.iter().enumerate() {
        if entry.status != ClusterStatus::Free && owner[index].is_none() {
            report.leaked.push(index as ClusterId);
        }
    }
    debug!(
        "check: {} entries, {} leaked, {} problems",
        report.entries,
        report.leaked.len(),
        report.problems.len()
    );
    Ok(report)
}
