// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("packsmith")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Packsmith Contributors")
        .about("Assemble packages from manifests")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Configuration file (TOML)"),
        )
        .arg(
            Arg::new("install_dir")
                .short('i')
                .long("install-dir")
                .value_name("DIR")
                .global(true)
                .help("Install directory, overriding the configuration"),
        )
        .arg(
            Arg::new("platform")
                .short('p')
                .long("platform")
                .global(true)
                .help("Platform identifier, overriding the configuration"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug logging"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("build")
                .about("Build every package declared in the given manifests")
                .arg(Arg::new("manifests").required(true).num_args(1..).help("Manifest files")),
        )
        .subcommand(Command::new("config").about("Print the effective configuration"))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("packsmith.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
