//! End-to-end smoke run against a real host image file.

use std::path::Path;

use anyhow::{ensure, Context};
use clusterfs::{FileSystem, FsError, Settings};

const OK_MSG: &str = "fs-smoke: ok";
const FAIL_MSG: &str = "fs-smoke: fail";
const HELLO: &[u8] = b"Hello, World!";
const PATCH: &[u8] = b"James";
const PATCHED: &[u8] = b"Hello, James!";

fn tree_steps(fs: &mut FileSystem) -> anyhow::Result<()> {
    fs.mkdir("/a")?;
    fs.mkdir("/a/b")?;
    fs.touch("/a/b/f")?;
    let listing = fs.ls("/a/b")?;
    ensure!(listing.len() == 1 && listing[0].name == "f" && listing[0].size == 0, "ls /a/b");
    ensure!(matches!(fs.rm("/a", false), Err(FsError::NotEmpty)), "rm /a without -r");

    fs.cd("/a")?;
    ensure!(matches!(fs.rm("/a", false), Err(FsError::ProtectedTarget)), "rm cwd");
    ensure!(matches!(fs.rm(".", true), Err(FsError::ProtectedTarget)), "rm .");
    fs.cd("/a/b")?;
    ensure!(matches!(fs.rm("/a", true), Err(FsError::ProtectedTarget)), "rm ancestor");
    ensure!(fs.pwd()? == "/a/b", "pwd");
    fs.cd("/")?;

    fs.rm("/a", true)?;
    ensure!(fs.ls("/")?.is_empty(), "root not empty after rm -r");
    Ok(())
}

fn content_steps(fs: &FileSystem) -> anyhow::Result<()> {
    fs.touch("/hello")?;
    fs.write("/hello", 0, HELLO)?;
    fs.write("/hello", 7, PATCH)?;
    let mut out = Vec::new();
    fs.cat("/hello", &mut out)?;
    ensure!(out == PATCHED, "patched content");

    let big: Vec<u8> = (0..200u8).cycle().take(1500).collect();
    fs.touch("/big")?;
    fs.write("/big", 0, &big)?;
    fs.cp("/big", "/big.copy", false)?;
    ensure!(fs.read("/big.copy", 0, big.len() as u64)? == big, "copied content");
    fs.mv("/big.copy", "/moved", false)?;
    ensure!(matches!(fs.stat("/big.copy"), Err(FsError::NotFound)), "mv source left behind");
    ensure!(fs.read("/moved", 0, big.len() as u64)? == big, "moved content");
    Ok(())
}

fn run(image: &Path) -> anyhow::Result<()> {
    let mut fs = FileSystem::make(image, Settings::new(1024, 64), false).context("make image")?;
    tree_steps(&mut fs).context("tree steps")?;
    drop(fs);

    let roomy = image.with_extension("roomy");
    let fs = FileSystem::make(&roomy, Settings::new(64 * 1024, 128), false).context("make image")?;
    content_steps(&fs).context("content steps")?;
    fs.flush()?;
    drop(fs);

    let fs = FileSystem::open(&roomy).context("reopen image")?;
    ensure!(fs.read("/hello", 0, 64)? == PATCHED, "content after reopen");
    let report = fs.check()?;
    ensure!(report.is_clean(), "check: {report}");
    Ok(())
}

fn main() {
    let result = tempfile::tempdir()
        .context("temporary directory")
        .and_then(|dir| run(&dir.path().join("smoke.img")));
    match result {
        Ok(()) => println!("{OK_MSG}"),
        Err(err) => {
            eprintln!("{err:#}");
            println!("{FAIL_MSG}");
            std::process::exit(1);
        }
    }
}
