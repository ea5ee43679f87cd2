use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Image file
    #[arg(long, short)]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh image and pack host files into it, one inode per file
    Pack {
        /// Image size in sectors
        #[arg(long, short, default_value_t = 16 * 2048)]
        size: usize,

        /// Leading sectors that are never allocated
        #[arg(long, short, default_value_t = 1)]
        reserved: usize,

        /// Host files to pack
        files: Vec<PathBuf>,
    },

    /// Write the content of the inode stored at the given sector to stdout
    Cat {
        /// Inode sector
        #[arg(long)]
        inode: usize,
    },
}
