//! Interactive command loop over a cluster image.

mod config;
mod console;

use std::io::{self, BufRead, Write};

use anyhow::Context;
use clusterfs::{make_image, FileSystem, FsResult};
use log::{info, warn};

use crate::config::{ShellConfig, LOG_ENV, USAGE};

/// Command name and argument synopsis, in `help` order.
const COMMANDS: &[(&str, &str)] = &[
    ("help", ""),
    ("exit", ""),
    ("clear", ""),
    ("ls", "[-l] [path]"),
    ("stat", "<path>"),
    ("cat", "<path>"),
    ("mkdir", "<path>"),
    ("touch", "<path>"),
    ("rmdir", "<path>"),
    ("rm", "[-r] <path>"),
    ("cp", "[-r] <src> <dst>"),
    ("mv", "[-r] <src> <dst>"),
    ("cd", "<path>"),
    ("pwd", ""),
    ("dirname", "<path>"),
    ("basename", "<path>"),
    ("import", "<host_path> <fs_path>"),
    ("export", "<fs_path> <host_path>"),
    ("fsinfo", ""),
    ("check", ""),
];

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

struct Shell {
    fs: FileSystem,
}

fn usage(out: &mut impl Write, command: &str) -> io::Result<()> {
    let synopsis = COMMANDS
        .iter()
        .find(|(name, _)| *name == command)
        .map_or("", |(_, synopsis)| *synopsis);
    writeln!(out, "{}", format!("usage: {command} {synopsis}").trim_end())
}

fn take_flag<'a>(args: &[&'a str], flag: &str) -> (bool, Vec<&'a str>) {
    match args.split_first() {
        Some((first, rest)) if *first == flag => (true, rest.to_vec()),
        _ => (false, args.to_vec()),
    }
}

impl Shell {
    fn new(fs: FileSystem) -> Self {
        Self { fs }
    }

    fn prompt(&self) -> String {
        console::prompt(&self.fs.pwd().unwrap_or_else(|_| "?".into()))
    }

    /// Runs one command line. Usage errors are printed here; engine errors
    /// go back to the caller.
    fn execute(&mut self, line: &str, out: &mut impl Write) -> FsResult<Flow> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = words.split_first() else {
            return Ok(Flow::Continue);
        };
        match (command, args) {
            ("help", []) => self.cmd_help(out)?,
            ("exit", []) => return Ok(Flow::Exit),
            ("clear", []) => write!(out, "\x1b[2J\x1b[H")?,
            ("ls", _) => self.cmd_ls(args, out)?,
            ("stat", [path]) => writeln!(out, "{}", self.fs.stat(path)?.verbose())?,
            ("cat", [path]) => {
                self.fs.cat(path, out)?;
                writeln!(out)?;
            }
            ("mkdir", [path]) => self.fs.mkdir(path)?,
            ("touch", [path]) => self.fs.touch(path)?,
            ("rmdir", [path]) => self.fs.rmdir(path)?,
            ("rm", _) => match take_flag(args, "-r") {
                (recursive, rest) if rest.len() == 1 => self.fs.rm(rest[0], recursive)?,
                _ => usage(out, command)?,
            },
            ("cp" | "mv", _) => match take_flag(args, "-r") {
                (recursive, rest) if rest.len() == 2 => {
                    if command == "cp" {
                        self.fs.cp(rest[0], rest[1], recursive)?
                    } else {
                        self.fs.mv(rest[0], rest[1], recursive)?
                    }
                }
                _ => usage(out, command)?,
            },
            ("cd", [path]) => self.fs.cd(path)?,
            ("pwd", []) => writeln!(out, "{}", self.fs.pwd()?)?,
            ("dirname", [path]) => writeln!(out, "{}", self.fs.dirname(path)?)?,
            ("basename", [path]) => writeln!(out, "{}", self.fs.basename(path)?)?,
            ("import", [host, path]) => self.fs.import_file(host, path)?,
            ("export", [path, host]) => self.fs.export_file(path, host)?,
            ("fsinfo", []) => write!(out, "{}", self.fs.info()?)?,
            ("check", []) => write!(out, "{}", self.fs.check()?)?,
            _ if COMMANDS.iter().any(|(name, _)| *name == command) => usage(out, command)?,
            _ => writeln!(out, "unknown command: {command}")?,
        }
        Ok(Flow::Continue)
    }

    fn cmd_help(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "commands:")?;
        for (name, synopsis) in COMMANDS {
            writeln!(out, "  {name} {synopsis}")?;
        }
        Ok(())
    }

    fn cmd_ls(&self, args: &[&str], out: &mut impl Write) -> FsResult<()> {
        let (long, rest) = take_flag(args, "-l");
        let path = match rest.as_slice() {
            [] => ".",
            [path] => *path,
            _ => return Ok(usage(out, "ls")?),
        };
        for entry in self.fs.ls(path)? {
            if long {
                writeln!(out, "{}", entry.verbose())?;
            } else {
                writeln!(out, "{entry}")?;
            }
        }
        Ok(())
    }
}

fn open_image(config: &ShellConfig) -> anyhow::Result<FileSystem> {
    let image = &config.image;
    if let Some(settings) = config.create {
        make_image(image, settings, config.allow_large)
            .with_context(|| format!("creating {}", image.display()))?;
    } else if !image.exists() {
        warn!(
            "{} does not exist, creating it with default settings",
            image.display()
        );
        make_image(image, ShellConfig::default_settings(), config.allow_large)
            .with_context(|| format!("creating {}", image.display()))?;
    }
    let fs = FileSystem::open(image).with_context(|| format!("opening {}", image.display()))?;
    info!("opened {} ({})", image.display(), fs.settings());
    Ok(fs)
}

fn run<R: BufRead, W: Write>(
    shell: &mut Shell,
    input: R,
    out: &mut W,
    interactive: bool,
) -> anyhow::Result<()> {
    let mut lines = input.lines();
    loop {
        if interactive {
            write!(out, "{}", shell.prompt())?;
            out.flush()?;
        }
        let Some(line) = lines.next() else {
            return Ok(());
        };
        let line = line?;
        let command = line.split_whitespace().next().unwrap_or_default();
        match shell.execute(&line, out) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => return Ok(()),
            Err(err) if err.is_fatal() => {
                writeln!(out, "{}", console::error_line(command, &err))?;
                return Err(anyhow::Error::new(err).context("image can no longer be trusted"));
            }
            Err(err) => writeln!(out, "{}", console::error_line(command, &err))?,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let env_level = std::env::var(LOG_ENV).ok();
    let config = ShellConfig::parse(std::env::args().skip(1), env_level.as_deref())?;
    if config.show_help {
        println!("{USAGE}");
        return Ok(());
    }
    console::init(config.log_level).context("installing logger")?;
    let mut shell = Shell::new(open_image(&config)?);
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    run(&mut shell, stdin.lock(), &mut stdout, true)?;
    shell.fs.flush()?;
    Ok(())
}
