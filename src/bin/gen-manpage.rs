//! Man page generator for cpldupdate-i2c
//!
//! Writes `cpldupdate-i2c.1` plus one page per subcommand
//! (`cpldupdate-i2c-info.1`, `cpldupdate-i2c-check.1`).
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
#[allow(dead_code)]
mod cli;

fn render(cmd: clap::Command, output_dir: &Path, name: &str) -> std::io::Result<PathBuf> {
    let man = clap_mangen::Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;

    let output_path = output_dir.join(format!("{}.1", name));
    fs::write(&output_path, buffer)?;
    Ok(output_path)
}

fn main() -> std::io::Result<()> {
    let output_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));

    fs::create_dir_all(&output_dir)?;

    let cmd = cli::Cli::command();
    let root = cmd.get_name().to_string();

    let mut pages = vec![render(cmd.clone(), &output_dir, &root)?];
    for sub in cmd.get_subcommands() {
        let name = format!("{}-{}", root, sub.get_name());
        pages.push(render(sub.clone(), &output_dir, &name)?);
    }

    for page in &pages {
        println!("Man page generated at: {}", page.display());
    }
    println!("\nTo view the man page:");
    println!("  man -l {}", pages[0].display());
    println!("\nTo install system-wide (requires sudo):");
    println!(
        "  sudo cp {}/*.1 /usr/local/share/man/man1/",
        output_dir.display()
    );
    println!("  sudo mandb");

    Ok(())
}
