use clustervfs::{corrupted, invalid_path, ClusterId, FsError, FsResult, PATH_DELIMITER, ROOT_CLUSTER};

use crate::handler::HandlerFactory;

#[derive(Clone)]
pub struct PathResolver {
    factory: HandlerFactory,
}

impl PathResolver {
    pub fn new(factory: HandlerFactory) -> Self {
        Self { factory }
    }

    /// First cluster of the entry at `path`, or `None` when the last existing
    /// directory on the way has no child with the next name.
    pub fn search(&self, path: &str, working: ClusterId) -> FsResult<Option<ClusterId>> {
        if path.is_empty() {
            return Err(invalid_path("empty path"));
        }
        let mut current = if path.starts_with(PATH_DELIMITER) {
            ROOT_CLUSTER
        } else {
            working
        };
        for segment in path.split(PATH_DELIMITER) {
            if segment.is_empty() {
                continue;
            }
            let meta = self.factory.metadata(current)?;
            if !meta.is_directory {
                return Err(FsError::NotADirectory);
            }
            match segment {
                "." => {}
                ".." => current = meta.parent_first_cluster,
                name => match self.child_named(current, name)? {
                    Some(child) => current = child,
                    None => return Ok(None),
                },
            }
        }
        if path.len() > 1
            && path.ends_with(PATH_DELIMITER)
            && !self.factory.metadata(current)?.is_directory
        {
            return Err(FsError::NotADirectory);
        }
        Ok(Some(current))
    }

    pub fn resolve(&self, path: &str, working: ClusterId) -> FsResult<ClusterId> {
        self.search(path, working)?.ok_or(FsError::NotFound)
    }

    fn child_named(&self, dir: ClusterId, name: &str) -> FsResult<Option<ClusterId>> {
        for &child in self.factory.read_directory(dir)?.children() {
            if self.factory.metadata(child)?.name == name {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Absolute path of the entry whose chain starts at `cluster`.
    pub fn trace(&self, cluster: ClusterId) -> FsResult<String> {
        let mut names = Vec::new();
        let mut current = cluster;
        while current != ROOT_CLUSTER {
            let meta = self.factory.metadata(current)?;
            names.push(meta.name);
            current = meta.parent_first_cluster;
            self.guard_depth(names.len(), cluster)?;
        }
        if names.is_empty() {
            return Ok(PATH_DELIMITER.to_string());
        }
        let mut path = String::new();
        for name in names.iter().rev() {
            path.push(PATH_DELIMITER);
            path.push_str(name);
        }
        Ok(path)
    }

    /// Whether `ancestor` lies on the parent chain of `node`, `node` included.
    pub fn is_descendant(&self, node: ClusterId, ancestor: ClusterId) -> FsResult<bool> {
        if ancestor == ROOT_CLUSTER {
            return Ok(true);
        }
        let mut current = node;
        let mut depth = 0;
        loop {
            if current == ancestor {
                return Ok(true);
            }
            if current == ROOT_CLUSTER {
                return Ok(false);
            }
            current = self.factory.metadata(current)?.parent_first_cluster;
            depth += 1;
            self.guard_depth(depth, node)?;
        }
    }

    fn guard_depth(&self, depth: usize, start: ClusterId) -> FsResult<()> {
        if depth as u64 > self.factory.fat().entries_count() {
            return Err(corrupted(format!("parent links from cluster {start} form a cycle")));
        }
        Ok(())
    }
}

pub fn dirname(path: &str) -> FsResult<String> {
    if path.is_empty() {
        return Err(invalid_path("empty path"));
    }
    let trimmed = path.trim_end_matches(PATH_DELIMITER);
    let parent = match trimmed.rfind(PATH_DELIMITER) {
        None if trimmed.is_empty() => "/",
        None => ".",
        Some(index) => {
            let head = trimmed[..index].trim_end_matches(PATH_DELIMITER);
            if head.is_empty() {
                "/"
            } else {
                head
            }
        }
    };
    Ok(parent.to_string())
}

pub fn basename(path: &str) -> FsResult<String> {
    if path.is_empty() {
        return Err(invalid_path("empty path"));
    }
    let trimmed = path.trim_end_matches(PATH_DELIMITER);
    if trimmed.is_empty() {
        return Ok(PATH_DELIMITER.to_string());
    }
    let name = trimmed.rsplit(PATH_DELIMITER).next().unwrap_or(trimmed);
    Ok(name.to_string())
}
