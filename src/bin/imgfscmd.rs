use clap::{Parser, Subcommand};
use imgfs::error::ImgFsError;
use imgfs::header::{
    DEFAULT_MAX_FILES, DEFAULT_SMALL_RES, DEFAULT_THUMB_RES, MAX_SMALL_RES, MAX_THUMB_RES,
};
use imgfs::metadata::Resolution;
use imgfs::store::{CreateOptions, ImgFs, ListMode};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "imgfscmd",
    version = "1.0.0",
    about = "ImgFS command line tool",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the content of an ImgFS file
    List {
        imgfs_file: PathBuf,
    },
    /// Create a new ImgFS file
    ///
    /// Options: -max_files <N>  -thumb_res <W> <H>  -small_res <W> <H>
    Create {
        imgfs_file: PathBuf,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        options: Vec<String>,
    },
    /// Read an image and save it to the working directory
    Read {
        imgfs_file: PathBuf,
        img_id:     String,
        /// original | orig | thumbnail | thumb | small
        resolution: Option<String>,
    },
    /// Insert an image from disk
    Insert {
        imgfs_file: PathBuf,
        img_id:     String,
        image_file: PathBuf,
    },
    /// Delete an image
    Delete {
        imgfs_file: PathBuf,
        img_id:     String,
    },
    /// Display detailed usage
    Help,
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), ImgFsError> {
    match cli.command {

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { imgfs_file } => {
            let fs = ImgFs::open_read_only(&imgfs_file)?;
            println!("{}", fs.list(ListMode::Text)?);
        }

        // ── Create ───────────────────────────────────────────────────────────
        Commands::Create { imgfs_file, options } => {
            let opts = parse_create_options(&options)?;
            let fs = ImgFs::create(&imgfs_file, opts)?;
            println!(
                "Created: {}  ({} slot(s), thumb {}x{}, small {}x{})",
                imgfs_file.display(),
                fs.header.max_files,
                fs.header.resized_res[0], fs.header.resized_res[1],
                fs.header.resized_res[2], fs.header.resized_res[3],
            );
        }

        // ── Read ─────────────────────────────────────────────────────────────
        Commands::Read { imgfs_file, img_id, resolution } => {
            let resolution = match resolution {
                Some(name) => Resolution::from_name(&name).ok_or(ImgFsError::Resolutions)?,
                None       => Resolution::Orig,
            };

            // A first read at a derived resolution writes the variant back,
            // so the store must be open read/write.
            let mut fs = ImgFs::open(&imgfs_file)?;
            let image = fs.read(&img_id, resolution)?;

            let out_name = format!("{img_id}_{}.jpg", resolution.name());
            std::fs::write(&out_name, &image)?;
            println!("Saved: {out_name}  ({} B)", image.len());
        }

        // ── Insert ───────────────────────────────────────────────────────────
        Commands::Insert { imgfs_file, img_id, image_file } => {
            let image = std::fs::read(&image_file)?;
            let mut fs = ImgFs::open(&imgfs_file)?;
            fs.insert(&image, &img_id)?;
            println!("Inserted: {img_id}  ({} B)", image.len());
        }

        // ── Delete ───────────────────────────────────────────────────────────
        Commands::Delete { imgfs_file, img_id } => {
            let mut fs = ImgFs::open(&imgfs_file)?;
            fs.delete(&img_id)?;
            println!("Deleted: {img_id}");
        }

        // ── Help ─────────────────────────────────────────────────────────────
        Commands::Help => {
            print_help();
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Parse `create`'s single-dash options, keeping the historical surface:
/// `-max_files <N>`, `-thumb_res <W> <H>`, `-small_res <W> <H>`.
fn parse_create_options(args: &[String]) -> Result<CreateOptions, ImgFsError> {
    let mut opts = CreateOptions::default();
    let mut it = args.iter();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-max_files" => {
                opts.max_files = it
                    .next()
                    .ok_or(ImgFsError::NotEnoughArguments)?
                    .parse()
                    .map_err(|_| ImgFsError::MaxFiles)?;
            }
            "-thumb_res" => {
                opts.thumb_res = (next_res(&mut it)?, next_res(&mut it)?);
            }
            "-small_res" => {
                opts.small_res = (next_res(&mut it)?, next_res(&mut it)?);
            }
            _ => return Err(ImgFsError::InvalidArgument),
        }
    }
    Ok(opts)
}

fn next_res<'a, I: Iterator<Item = &'a String>>(it: &mut I) -> Result<u16, ImgFsError> {
    it.next()
        .ok_or(ImgFsError::NotEnoughArguments)?
        .parse()
        .map_err(|_| ImgFsError::Resolutions)
}

fn print_help() {
    println!(
        "imgfscmd [COMMAND] [ARGUMENTS]\n\
         \x20 help: displays this help.\n\
         \x20 list <imgFS_filename>: list imgFS content.\n\
         \x20 create <imgFS_filename> [options]: create a new imgFS.\n\
         \x20     options are:\n\
         \x20         -max_files <MAX_FILES>: maximum number of files.\n\
         \x20                                 default value is {DEFAULT_MAX_FILES}\n\
         \x20         -thumb_res <X_RES> <Y_RES>: resolution for thumbnail images.\n\
         \x20                                 default value is {DEFAULT_THUMB_RES}x{DEFAULT_THUMB_RES}\n\
         \x20                                 maximum value is {MAX_THUMB_RES}x{MAX_THUMB_RES}\n\
         \x20         -small_res <X_RES> <Y_RES>: resolution for small images.\n\
         \x20                                 default value is {DEFAULT_SMALL_RES}x{DEFAULT_SMALL_RES}\n\
         \x20                                 maximum value is {MAX_SMALL_RES}x{MAX_SMALL_RES}\n\
         \x20 read   <imgFS_filename> <imgID> [original|orig|thumbnail|thumb|small]:\n\
         \x20     read an image from the imgFS and save it to a file.\n\
         \x20     default resolution is \"original\".\n\
         \x20 insert <imgFS_filename> <imgID> <filename>: insert a new image in the imgFS.\n\
         \x20 delete <imgFS_filename> <imgID>: delete image imgID from imgFS."
    );
}
