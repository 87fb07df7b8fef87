use clap::Parser;
use imgfs::error::ImgFsError;
use imgfs::server::{Server, DEFAULT_PORT};
use imgfs::store::ImgFs;
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "imgfs_server", version = "1.0.0", about = "ImgFS HTTP server")]
struct Cli {
    /// ImgFS file to serve
    imgfs_file: PathBuf,
    /// Listening port
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), ImgFsError> {
    let store = ImgFs::open(&cli.imgfs_file)?;
    info!("serving {}\n{}", cli.imgfs_file.display(), store.header);

    let server = Server::bind(store, cli.port)?;
    println!("ImgFS server started on http://localhost:{}", server.local_port()?);
    server.run_until_shutdown()
}
