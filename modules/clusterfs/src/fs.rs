//! The file-system engine: path-level operations over one image.

use core::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::rc::Rc;

use clustervfs::{
    corrupted, invalid_path, ClusterId, EntryKind, FsError, FsResult, FAT_OFFSET, METADATA_SIZE,
    NAME_SIZE, PATH_DELIMITER, ROOT_CLUSTER,
};
use log::{debug, warn};

use crate::block::{FileDevice, SharedDevice};
use crate::check::{self, CheckReport};
use crate::fat::{ClusterStatus, Fat, FatEntry};
use crate::handler::{Entry, FileReader, FileWriter, HandlerFactory};
use crate::layout::{check_signature, Settings};
use crate::metadata::Metadata;
use crate::mkfs;
use crate::path::{self, PathResolver};

const HEADER: u64 = METADATA_SIZE as u64;

#[derive(Clone, Debug)]
pub struct FsInfo {
    pub settings: Settings,
    pub entries_count: u64,
    pub clusters_start: u64,
    pub free_clusters: u64,
    pub used_clusters: u64,
    pub table: Vec<FatEntry>,
}

impl fmt::Display for FsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.settings)?;
        writeln!(
            f,
            "clusters: {} ({} used, {} free), arena at offset {}",
            self.entries_count, self.used_clusters, self.free_clusters, self.clusters_start
        )?;
        for (index, entry) in self.table.iter().enumerate() {
            if entry.status != ClusterStatus::Free {
                writeln!(f, "  {index}: {entry}")?;
            }
        }
        Ok(())
    }
}

pub struct FileSystem {
    device: SharedDevice,
    settings: Settings,
    fat: Fat,
    pub(crate) factory: HandlerFactory,
    resolver: PathResolver,
    working_dir: ClusterId,
}

impl FileSystem {
    pub fn open(path: impl AsRef<Path>) -> FsResult<Self> {
        Self::mount(Rc::new(FileDevice::open(path)?))
    }

    pub fn make(path: impl AsRef<Path>, settings: Settings, allow_large: bool) -> FsResult<Self> {
        let path = path.as_ref();
        mkfs::make_image(path, settings, allow_large)?;
        Self::open(path)
    }

    pub fn format(device: SharedDevice, settings: Settings, allow_large: bool) -> FsResult<Self> {
        mkfs::format(device.clone(), settings, allow_large)?;
        Self::mount(device)
    }

    pub fn mount(device: SharedDevice) -> FsResult<Self> {
        check_signature(device.as_ref())?;
        let settings = Settings::read_from(device.as_ref())?;
        settings.validate(true)?;
        if device.size()? < settings.image_size {
            return Err(FsError::InvalidSettings(format!(
                "image is truncated: expected {} bytes",
                settings.image_size
            )));
        }
        let fat = Fat::new(device.clone(), FAT_OFFSET, settings.entries_count());
        let factory = HandlerFactory::new(device.clone(), fat.clone(), settings);
        let resolver = PathResolver::new(factory.clone());
        let fs = Self {
            device,
            settings,
            fat,
            factory,
            resolver,
            working_dir: ROOT_CLUSTER,
        };
        debug!("mounted image: {settings}, {} clusters", fs.fat.entries_count());
        if !fs.fat.is_allocated(ROOT_CLUSTER)? {
            fs.bootstrap_root()?;
        }
        Ok(fs)
    }

    fn bootstrap_root(&self) -> FsResult<()> {
        let root = self.fat.allocate()?;
        if root != ROOT_CLUSTER {
            return Err(corrupted(format!("root bootstrap claimed cluster {root}")));
        }
        self.factory.metadata_handler(root).write(&Metadata::new(
            "/",
            EntryKind::Dir,
            ROOT_CLUSTER,
            ROOT_CLUSTER,
        ))?;
        debug!("created root directory");
        Ok(())
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn working_dir(&self) -> ClusterId {
        self.working_dir
    }

    pub fn flush(&self) -> FsResult<()> {
        self.device.flush()
    }

    fn resolve(&self, path: &str) -> FsResult<ClusterId> {
        self.resolver.resolve(path, self.working_dir)
    }

    fn resolve_file(&self, path: &str) -> FsResult<(ClusterId, Metadata)> {
        let cluster = self.resolve(path)?;
        let meta = self.factory.metadata(cluster)?;
        if meta.is_directory {
            return Err(FsError::IsADirectory);
        }
        Ok((cluster, meta))
    }

    pub fn ls(&self, path: &str) -> FsResult<Vec<Metadata>> {
        let dir = self.factory.read_directory(self.resolve(path)?)?;
        dir.children()
            .iter()
            .map(|&child| self.factory.metadata(child))
            .collect()
    }

    pub fn stat(&self, path: &str) -> FsResult<Metadata> {
        self.factory.metadata(self.resolve(path)?)
    }

    pub fn entry(&self, path: &str) -> FsResult<Entry> {
        self.factory.load_entry(self.resolve(path)?)
    }

    pub fn mkdir(&self, path: &str) -> FsResult<()> {
        if self.resolver.search(path, self.working_dir)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        self.create_at(path, EntryKind::Dir)?;
        Ok(())
    }

    /// Creates an empty file unless something already exists at `path`.
    pub fn touch(&self, path: &str) -> FsResult<()> {
        if self.resolver.search(path, self.working_dir)?.is_some() {
            return Ok(());
        }
        if path.ends_with(PATH_DELIMITER) {
            return Err(FsError::NotADirectory);
        }
        self.create_at(path, EntryKind::File)?;
        Ok(())
    }

    fn create_at(&self, path: &str, kind: EntryKind) -> FsResult<ClusterId> {
        let name = path::basename(path)?;
        let parent = self.resolve(&path::dirname(path)?)?;
        self.create_child(parent, &name, kind)
    }

    fn create_child(&self, parent: ClusterId, name: &str, kind: EntryKind) -> FsResult<ClusterId> {
        validate_name(name)?;
        if !self.factory.metadata(parent)?.is_directory {
            return Err(FsError::NotADirectory);
        }
        let cluster = self.fat.allocate()?;
        let linked = self
            .factory
            .metadata_handler(cluster)
            .write(&Metadata::new(name, kind, cluster, parent))
            .and_then(|()| self.factory.append_child(parent, cluster));
        if let Err(err) = linked {
            if let Err(cleanup) = self.fat.free(cluster) {
                warn!("could not release cluster {cluster}: {cleanup}");
            }
            return Err(err);
        }
        debug!("created {kind:?} `{name}` at cluster {cluster} under {parent}");
        Ok(cluster)
    }

    fn ensure_unprotected(&self, cluster: ClusterId) -> FsResult<()> {
        if self.resolver.is_descendant(self.working_dir, cluster)? {
            return Err(FsError::ProtectedTarget);
        }
        Ok(())
    }

    pub fn rmdir(&self, path: &str) -> FsResult<()> {
        let cluster = self.resolve(path)?;
        let dir = self.factory.read_directory(cluster)?;
        self.ensure_unprotected(cluster)?;
        if !dir.is_empty() {
            return Err(FsError::NotEmpty);
        }
        self.delete_entry(cluster)
    }

    pub fn rm(&self, path: &str, recursive: bool) -> FsResult<()> {
        let cluster = self.resolve(path)?;
        self.remove_cluster(cluster, recursive)
    }

    fn remove_cluster(&self, cluster: ClusterId, recursive: bool) -> FsResult<()> {
        let meta = self.factory.metadata(cluster)?;
        if !meta.is_directory {
            return self.delete_entry(cluster);
        }
        self.ensure_unprotected(cluster)?;
        if recursive {
            self.unlink(cluster, &meta)?;
            return self.free_subtree(cluster);
        }
        if !self.factory.read_directory(cluster)?.is_empty() {
            return Err(FsError::NotEmpty);
        }
        self.delete_entry(cluster)
    }

    /// Drops `cluster` from its parent's child list, then frees its chain.
    fn delete_entry(&self, cluster: ClusterId) -> FsResult<()> {
        let meta = self.factory.metadata(cluster)?;
        self.unlink(cluster, &meta)?;
        self.fat.free(cluster)
    }

    fn unlink(&self, cluster: ClusterId, meta: &Metadata) -> FsResult<()> {
        let parent = meta.parent_first_cluster;
        let mut siblings = self.factory.read_directory(parent)?;
        if !siblings.remove(cluster) {
            return Err(corrupted(format!(
                "cluster {cluster} is missing from its parent {parent}"
            )));
        }
        self.factory.replace_content(parent, &siblings.to_bytes())
    }

    fn free_subtree(&self, cluster: ClusterId) -> FsResult<()> {
        if let Entry::Directory(_, dir) = self.factory.load_entry(cluster)? {
            for &child in dir.children() {
                self.free_subtree(child)?;
            }
        }
        self.fat.free(cluster)
    }

    pub fn cp(&self, src: &str, dst: &str, recursive: bool) -> FsResult<()> {
        let source = self.resolve(src)?;
        let (parent, name) = self.prepare_destination(dst)?;
        if let Entry::Directory(_, dir) = self.factory.load_entry(source)? {
            if !recursive && !dir.is_empty() {
                return Err(FsError::NotEmpty);
            }
            if self.resolver.is_descendant(parent, source)? {
                return Err(invalid_path("cannot copy a directory into itself"));
            }
        }
        self.copy_entry(source, parent, &name, recursive)?;
        Ok(())
    }

    fn prepare_destination(&self, dst: &str) -> FsResult<(ClusterId, String)> {
        if self.resolver.search(dst, self.working_dir)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        let name = path::basename(dst)?;
        validate_name(&name)?;
        let parent = self.resolve(&path::dirname(dst)?)?;
        if !self.factory.metadata(parent)?.is_directory {
            return Err(FsError::NotADirectory);
        }
        Ok((parent, name))
    }

    fn copy_entry(
        &self,
        source: ClusterId,
        parent: ClusterId,
        name: &str,
        recursive: bool,
    ) -> FsResult<ClusterId> {
        match self.factory.load_entry(source)? {
            Entry::File(_) => {
                let copy = self.create_child(parent, name, EntryKind::File)?;
                let mut reader = self.factory.file_reader(source)?;
                let mut writer = self.factory.file_writer(copy)?;
                loop {
                    let block = reader.read_next()?;
                    if block.is_empty() {
                        break;
                    }
                    writer.write_next(&block)?;
                }
                Ok(copy)
            }
            Entry::Directory(_, dir) => {
                let copy = self.create_child(parent, name, EntryKind::Dir)?;
                if recursive {
                    for &child in dir.children() {
                        let child_name = self.factory.metadata(child)?.name;
                        self.copy_entry(child, copy, &child_name, true)?;
                    }
                }
                Ok(copy)
            }
        }
    }

    /// Copy followed by removal of the source; not atomic.
    pub fn mv(&self, src: &str, dst: &str, recursive: bool) -> FsResult<()> {
        let source = self.resolve(src)?;
        if self.factory.metadata(source)?.is_directory {
            self.ensure_unprotected(source)?;
        }
        self.cp(src, dst, recursive)?;
        self.remove_cluster(source, recursive)
    }

    pub fn cat(&self, path: &str, sink: &mut impl Write) -> FsResult<()> {
        let (cluster, _) = self.resolve_file(path)?;
        let mut reader = self.factory.file_reader(cluster)?;
        loop {
            let block = reader.read_next()?;
            if block.is_empty() {
                break;
            }
            sink.write_all(&block)?;
        }
        sink.flush()?;
        Ok(())
    }

    pub fn import_file(&self, host_path: impl AsRef<Path>, fs_path: &str) -> FsResult<()> {
        let mut source = File::open(host_path)?;
        self.import_from(&mut source, fs_path)
    }

    pub fn import_from(&self, source: &mut impl Read, fs_path: &str) -> FsResult<()> {
        if let Some(existing) = self.resolver.search(fs_path, self.working_dir)? {
            if self.factory.metadata(existing)?.is_directory {
                return Err(FsError::IsADirectory);
            }
            return Err(FsError::AlreadyExists);
        }
        let cluster = self.create_at(fs_path, EntryKind::File)?;
        if let Err(err) = self.fill_from(cluster, source) {
            if let Err(cleanup) = self.delete_entry(cluster) {
                warn!("could not remove partial import {fs_path}: {cleanup}");
            }
            return Err(err);
        }
        Ok(())
    }

    fn fill_from(&self, cluster: ClusterId, source: &mut impl Read) -> FsResult<()> {
        let mut writer = self.factory.file_writer(cluster)?;
        let mut block = vec![0u8; self.settings.cluster_size as usize];
        loop {
            let read = source.read(&mut block)?;
            if read == 0 {
                return Ok(());
            }
            writer.write_next(&block[..read])?;
        }
    }

    /// Copies the file at `fs_path` to a host file, removing the host file
    /// again if the copy fails.
    pub fn export_file(&self, fs_path: &str, host_path: impl AsRef<Path>) -> FsResult<()> {
        self.resolve_file(fs_path)?;
        let host_path = host_path.as_ref();
        let mut sink = File::create(host_path)?;
        if let Err(err) = self.cat(fs_path, &mut sink) {
            drop(sink);
            if let Err(cleanup) = std::fs::remove_file(host_path) {
                warn!("could not remove {}: {cleanup}", host_path.display());
            }
            return Err(err);
        }
        Ok(())
    }

    pub fn cd(&mut self, path: &str) -> FsResult<()> {
        let cluster = self.resolve(path)?;
        if !self.factory.metadata(cluster)?.is_directory {
            return Err(FsError::NotADirectory);
        }
        self.working_dir = cluster;
        Ok(())
    }

    pub fn pwd(&self) -> FsResult<String> {
        self.resolver.trace(self.working_dir)
    }

    pub fn dirname(&self, path: &str) -> FsResult<String> {
        path::dirname(path)
    }

    pub fn basename(&self, path: &str) -> FsResult<String> {
        path::basename(path)
    }

    /// Up to `len` bytes of content starting at `offset`.
    pub fn read(&self, path: &str, offset: u64, len: u64) -> FsResult<Vec<u8>> {
        let (cluster, meta) = self.resolve_file(path)?;
        if offset >= meta.size {
            return Ok(Vec::new());
        }
        let len = core::cmp::min(len, meta.size - offset);
        self.factory.byte_reader(cluster).read_bytes(HEADER + offset, len)
    }

    /// Writes `bytes` at `offset`, which may be at most the current size.
    pub fn write(&self, path: &str, offset: u64, bytes: &[u8]) -> FsResult<()> {
        let (cluster, _) = self.resolve_file(path)?;
        let mut writer = self.factory.file_writer(cluster)?;
        writer.set_offset(offset);
        writer.write(bytes)
    }

    pub fn overwrite(&self, path: &str, bytes: &[u8]) -> FsResult<()> {
        let (cluster, _) = self.resolve_file(path)?;
        self.factory.replace_content(cluster, bytes)
    }

    pub fn reader(&self, path: &str) -> FsResult<FileReader> {
        let (cluster, _) = self.resolve_file(path)?;
        self.factory.file_reader(cluster)
    }

    pub fn writer(&self, path: &str) -> FsResult<FileWriter> {
        let (cluster, _) = self.resolve_file(path)?;
        self.factory.file_writer(cluster)
    }

    pub fn info(&self) -> FsResult<FsInfo> {
        let table = self.fat.entries()?;
        let free_clusters = table
            .iter()
            .filter(|e| e.status == ClusterStatus::Free)
            .count() as u64;
        Ok(FsInfo {
            settings: self.settings,
            entries_count: self.fat.entries_count(),
            clusters_start: self.settings.clusters_start(),
            free_clusters,
            used_clusters: self.fat.entries_count() - free_clusters,
            table,
        })
    }

    pub fn check(&self) -> FsResult<CheckReport> {
        check::run(&self.factory)
    }
}

fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name == "/" {
        return Err(invalid_path(format!("`{name}` is not a valid entry name")));
    }
    if name.contains('/') {
        return Err(invalid_path(format!("`{name}` contains a path delimiter")));
    }
    if name.len() > NAME_SIZE {
        return Err(invalid_path(format!(
            "`{name}` is longer than {NAME_SIZE} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemDevice;

    fn small_fs() -> FileSystem {
        FileSystem::format(Rc::new(MemDevice::new()), Settings::new(1024, 64), false).unwrap()
    }

    fn roomy_fs() -> FileSystem {
        FileSystem::format(Rc::new(MemDevice::new()), Settings::new(64 * 1024, 64), false).unwrap()
    }

    fn names(entries: &[Metadata]) -> Vec<&str> {
        entries.iter().map(|m| m.name.as_str()).collect()
    }

    fn cat_string(fs: &FileSystem, path: &str) -> String {
        let mut out = Vec::new();
        fs.cat(path, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn bootstrap_root() {
        let fs = small_fs();
        let root = fs.stat("/").unwrap();
        assert!(root.is_directory);
        assert_eq!(root.name, "/");
        assert_eq!(root.first_cluster, ROOT_CLUSTER);
        assert_eq!(root.parent_first_cluster, ROOT_CLUSTER);
        assert!(fs.ls("/").unwrap().is_empty());
        assert_eq!(fs.pwd().unwrap(), "/");
    }

    #[test]
    fn mount_rejects_foreign_images() {
        let dev: SharedDevice = Rc::new(MemDevice::from_vec(vec![0u8; 1024]));
        assert!(matches!(FileSystem::mount(dev), Err(FsError::NotAFileSystem)));
    }

    #[test]
    fn nested_tree_scenario() {
        let fs = small_fs();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        fs.touch("/a/b/f").unwrap();
        let listing = fs.ls("/a/b").unwrap();
        assert_eq!(names(&listing), ["f"]);
        assert_eq!(listing[0].size, 0);
        assert!(!listing[0].is_directory);

        assert!(matches!(fs.rm("/a", false), Err(FsError::NotEmpty)));
        fs.rm("/a", true).unwrap();
        assert!(fs.ls("/").unwrap().is_empty());
        assert!(fs.check().unwrap().is_clean());
        assert_eq!(fs.info().unwrap().used_clusters, 2);
    }

    #[test]
    fn create_errors() {
        let fs = small_fs();
        fs.mkdir("/a").unwrap();
        assert!(matches!(fs.mkdir("/a"), Err(FsError::AlreadyExists)));
        assert!(matches!(fs.mkdir("/x/y"), Err(FsError::NotFound)));
        fs.touch("/a/f").unwrap();
        assert!(matches!(fs.mkdir("/a/f/g"), Err(FsError::NotADirectory)));
        assert!(matches!(fs.mkdir(""), Err(FsError::InvalidPath(_))));
        let long = format!("/{}", "n".repeat(NAME_SIZE + 1));
        assert!(matches!(fs.touch(&long), Err(FsError::InvalidPath(_))));

        fs.touch("/a").unwrap();
        assert!(fs.stat("/a").unwrap().is_directory);
        fs.touch("/a/f").unwrap();
        assert_eq!(fs.ls("/a").unwrap().len(), 1);

        assert!(matches!(fs.touch("/a/g/"), Err(FsError::NotADirectory)));
        assert!(matches!(fs.stat("/a/g"), Err(FsError::NotFound)));
        fs.touch("/a/").unwrap();
        fs.mkdir("/a/h/").unwrap();
        assert!(fs.stat("/a/h").unwrap().is_directory);
    }

    #[test]
    fn relative_paths_follow_cd() {
        let mut fs = small_fs();
        fs.mkdir("/a").unwrap();
        fs.cd("a").unwrap();
        fs.mkdir("b").unwrap();
        fs.touch("b/f").unwrap();
        assert_eq!(fs.pwd().unwrap(), "/a");
        fs.cd("b").unwrap();
        assert_eq!(fs.pwd().unwrap(), "/a/b");
        assert_eq!(names(&fs.ls(".").unwrap()), ["f"]);
        fs.cd("..").unwrap();
        assert_eq!(fs.pwd().unwrap(), "/a");
        assert!(matches!(fs.cd("b/f"), Err(FsError::NotADirectory)));
        assert!(matches!(fs.cd("nope"), Err(FsError::NotFound)));
        fs.cd("/").unwrap();
        assert_eq!(fs.working_dir(), ROOT_CLUSTER);
    }

    #[test]
    fn protected_targets() {
        let mut fs = small_fs();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        fs.cd("/a").unwrap();
        assert!(matches!(fs.rm("/a", false), Err(FsError::ProtectedTarget)));
        assert!(matches!(fs.rm(".", true), Err(FsError::ProtectedTarget)));
        assert!(matches!(fs.rmdir("/"), Err(FsError::ProtectedTarget)));
        fs.cd("/a/b").unwrap();
        assert!(matches!(fs.rm("/a", true), Err(FsError::ProtectedTarget)));
        assert!(matches!(fs.rmdir("/a/b"), Err(FsError::ProtectedTarget)));
        assert!(matches!(fs.mv("/a", "/c", true), Err(FsError::ProtectedTarget)));
        fs.cd("/").unwrap();
        fs.rmdir("/a/b").unwrap();
        fs.rmdir("/a").unwrap();
        assert!(fs.ls("/").unwrap().is_empty());
    }

    #[test]
    fn rmdir_and_rm_kinds() {
        let fs = small_fs();
        fs.touch("/f").unwrap();
        fs.mkdir("/d").unwrap();
        assert!(matches!(fs.rmdir("/f"), Err(FsError::NotADirectory)));
        assert!(matches!(fs.rmdir("/missing"), Err(FsError::NotFound)));
        fs.rm("/f", false).unwrap();
        fs.rm("/d", false).unwrap();
        assert!(fs.ls("/").unwrap().is_empty());
        assert_eq!(fs.info().unwrap().used_clusters, 2);
    }

    #[test]
    fn write_then_patch() {
        let fs = small_fs();
        fs.touch("/greeting").unwrap();
        fs.write("/greeting", 0, b"Hello, World!").unwrap();
        fs.write("/greeting", 7, b"James").unwrap();
        assert_eq!(cat_string(&fs, "/greeting"), "Hello, James!");
        assert_eq!(fs.stat("/greeting").unwrap().size, 13);
        assert_eq!(fs.read("/greeting", 7, 100).unwrap(), b"James!");
        assert!(fs.read("/greeting", 13, 5).unwrap().is_empty());
        assert!(matches!(
            fs.write("/greeting", 20, b"x"),
            Err(FsError::InvalidOffset { offset: 20, size: 13 })
        ));
        fs.write("/greeting", 13, b"?").unwrap();
        assert_eq!(cat_string(&fs, "/greeting"), "Hello, James!?");
    }

    #[test]
    fn content_across_cluster_boundaries() {
        let fs = roomy_fs();
        fs.touch("/blob").unwrap();
        let data: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();
        fs.write("/blob", 0, &data).unwrap();
        assert_eq!(fs.read("/blob", 0, 500).unwrap(), data);
        for (offset, len) in [(0u64, 0u64), (0, 1), (39, 1), (38, 2), (100, 200), (499, 10)] {
            let end = core::cmp::min(offset + len, 500) as usize;
            assert_eq!(fs.read("/blob", offset, len).unwrap(), &data[offset as usize..end]);
        }
        fs.overwrite("/blob", b"small").unwrap();
        assert_eq!(cat_string(&fs, "/blob"), "small");
        assert!(fs.check().unwrap().is_clean());
    }

    #[test]
    fn reader_and_writer_handles() {
        let fs = roomy_fs();
        fs.touch("/log").unwrap();
        let mut writer = fs.writer("/log").unwrap();
        for line in ["one\n", "two\n", "three\n"] {
            writer.write_next(line.as_bytes()).unwrap();
        }
        let mut reader = fs.reader("/log").unwrap();
        assert_eq!(reader.size(), 14);
        let mut out = Vec::new();
        loop {
            let block = reader.read_next().unwrap();
            if block.is_empty() {
                break;
            }
            out.extend(block);
        }
        assert_eq!(out, b"one\ntwo\nthree\n");
        fs.mkdir("/dir").unwrap();
        assert!(matches!(fs.reader("/dir"), Err(FsError::IsADirectory)));
        assert!(matches!(fs.writer("/dir"), Err(FsError::IsADirectory)));
    }

    #[test]
    fn writer_cannot_expose_freed_clusters() {
        let fs = roomy_fs();
        fs.touch("/secret").unwrap();
        fs.write("/secret", 0, &[b'S'; 300]).unwrap();
        fs.rm("/secret", false).unwrap();

        fs.touch("/new").unwrap();
        let mut writer = fs.writer("/new").unwrap();
        writer.set_offset(200);
        assert!(matches!(
            writer.write(b"x"),
            Err(FsError::InvalidOffset { offset: 200, size: 0 })
        ));
        assert_eq!(fs.stat("/new").unwrap().size, 0);
        assert!(fs.read("/new", 0, 201).unwrap().is_empty());
        assert!(fs.check().unwrap().is_clean());
    }

    #[test]
    fn copy_and_move() {
        let fs = roomy_fs();
        let text = "cluster chains ".repeat(20);
        fs.touch("/src").unwrap();
        fs.write("/src", 0, text.as_bytes()).unwrap();
        fs.cp("/src", "/dup", false).unwrap();
        assert_eq!(cat_string(&fs, "/dup"), text);
        assert!(matches!(fs.cp("/src", "/dup", false), Err(FsError::AlreadyExists)));

        fs.mkdir("/d").unwrap();
        fs.mv("/dup", "/d/moved", false).unwrap();
        assert!(matches!(fs.stat("/dup"), Err(FsError::NotFound)));
        assert_eq!(cat_string(&fs, "/d/moved"), text);
        let moved = fs.stat("/d/moved").unwrap();
        assert_eq!(moved.parent_first_cluster, fs.stat("/d").unwrap().first_cluster);
        assert!(fs.check().unwrap().is_clean());
    }

    #[test]
    fn directory_copies() {
        let fs = roomy_fs();
        fs.mkdir("/t").unwrap();
        fs.mkdir("/t/inner").unwrap();
        fs.touch("/t/inner/f").unwrap();
        fs.write("/t/inner/f", 0, b"payload").unwrap();

        assert!(matches!(fs.cp("/t", "/u", false), Err(FsError::NotEmpty)));
        assert!(matches!(fs.cp("/t", "/t/inner/again", true), Err(FsError::InvalidPath(_))));
        assert!(matches!(fs.cp("/t/inner", "/empty", false), Err(FsError::NotEmpty)));
        fs.mkdir("/e").unwrap();
        fs.cp("/e", "/e2", false).unwrap();
        assert!(fs.ls("/e2").unwrap().is_empty());

        fs.cp("/t", "/u", true).unwrap();
        assert_eq!(cat_string(&fs, "/u/inner/f"), "payload");
        fs.mv("/u", "/v", true).unwrap();
        assert!(matches!(fs.stat("/u"), Err(FsError::NotFound)));
        assert_eq!(cat_string(&fs, "/v/inner/f"), "payload");
        let copied = fs.stat("/v/inner/f").unwrap().first_cluster;
        assert_eq!(fs.resolver.trace(copied).unwrap(), "/v/inner/f");
        assert!(fs.check().unwrap().is_clean());
    }

    #[test]
    fn import_export_host_files() {
        let fs = roomy_fs();
        let dir = tempfile::tempdir().unwrap();
        let host_in = dir.path().join("in.bin");
        let host_out = dir.path().join("out.bin");
        let payload: Vec<u8> = (0..1000u32).map(|i| (i * 7) as u8).collect();
        std::fs::write(&host_in, &payload).unwrap();

        fs.import_file(&host_in, "/copy").unwrap();
        assert_eq!(fs.stat("/copy").unwrap().size, 1000);
        assert!(matches!(fs.import_file(&host_in, "/copy"), Err(FsError::AlreadyExists)));
        fs.mkdir("/d").unwrap();
        assert!(matches!(fs.import_file(&host_in, "/d"), Err(FsError::IsADirectory)));
        assert!(matches!(
            fs.import_file(dir.path().join("absent"), "/never"),
            Err(FsError::Io(_))
        ));
        assert!(matches!(fs.stat("/never"), Err(FsError::NotFound)));

        fs.export_file("/copy", &host_out).unwrap();
        assert_eq!(std::fs::read(&host_out).unwrap(), payload);
        assert!(matches!(fs.export_file("/d", dir.path().join("x")), Err(FsError::IsADirectory)));
        assert!(!dir.path().join("x").exists());
    }

    #[test]
    fn failed_export_removes_host_file() {
        let fs = roomy_fs();
        let dir = tempfile::tempdir().unwrap();
        let host_out = dir.path().join("partial.bin");
        fs.touch("/long").unwrap();
        fs.write("/long", 0, &[0x5a; 1000]).unwrap();

        let first = fs.stat("/long").unwrap().first_cluster;
        let chain = fs.factory.fat().chain(first).unwrap();
        assert!(chain.len() > 8);
        fs.factory.fat().set_entry(chain[8], FatEntry::FREE).unwrap();

        let err = fs.export_file("/long", &host_out).unwrap_err();
        assert!(err.is_fatal());
        assert!(!host_out.exists());
    }

    #[test]
    fn out_of_space_is_reported() {
        let fs = small_fs();
        let mut created = 0;
        let err = loop {
            match fs.touch(&format!("/f{created}")) {
                Ok(()) => created += 1,
                Err(err) => break err,
            }
        };
        assert!(matches!(err, FsError::OutOfSpace));
        assert!(created > 0);
        assert!(fs.check().unwrap().is_clean());
    }

    #[test]
    fn file_backed_image_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        {
            let fs = FileSystem::make(&path, Settings::new(4096, 64), false).unwrap();
            fs.mkdir("/keep").unwrap();
            fs.touch("/keep/note").unwrap();
            fs.write("/keep/note", 0, b"persisted").unwrap();
            fs.flush().unwrap();
        }
        let fs = FileSystem::open(&path).unwrap();
        assert_eq!(fs.read("/keep/note", 0, 64).unwrap(), b"persisted");
        assert_eq!(fs.settings(), Settings::new(4096, 64));
        let info = fs.info().unwrap();
        assert_eq!(info.entries_count, Settings::new(4096, 64).entries_count());
        assert!(info.to_string().contains("cluster size: 64b"));
    }
}
