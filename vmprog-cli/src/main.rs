use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use ed25519_dalek::SigningKey;
use listing::ListingFormatter;
use rand::rngs::OsRng;
use vmprog::{
    load_verifying_key, ConfigReader, Diagnostics, EntryKind, PackageBuilder, PackageReader,
    ProgramConfig, SignedDescriptor, SigningKeys, BITSTREAM_FILES,
};

mod convert;
mod listing;

const PRIVATE_KEY_FILE: &str = "signing_priv.bin";
const PUBLIC_KEY_FILE: &str = "signing_pub.bin";

#[derive(Parser)]
#[command(name = "vmprog", about = "Build, inspect, and verify VMPROG program packages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a TOML program description into a binary configuration record
    Convert {
        /// TOML program description
        input: PathBuf,
        /// Output file, conventionally program_config.bin
        output: PathBuf,
    },
    /// Package a program directory into a .vmprog file
    Pack {
        /// Directory holding program_config.bin and a bitstreams/ subdirectory
        input_dir: PathBuf,
        /// Output package file
        output: PathBuf,
        /// Build an unsigned package
        #[arg(long)]
        no_sign: bool,
        /// Directory holding signing_priv.bin and signing_pub.bin
        #[arg(long, default_value = "keys")]
        keys_dir: PathBuf,
        /// Pin the descriptor build id instead of stamping the current time
        #[arg(long)]
        build_id: Option<u32>,
    },
    /// Verify every invariant of a package file
    Verify {
        /// Package file
        package: PathBuf,
        /// Directory holding signing_pub.bin
        #[arg(long, default_value = "keys")]
        keys_dir: PathBuf,
    },
    /// Show the header, TOC, descriptor, and configuration of a package
    Info {
        /// Package file
        package: PathBuf,
    },
    /// Generate an Ed25519 signing key pair
    Keygen {
        /// Directory the key files are written to
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Convert { input, output } => convert_command(&input, &output),
        Command::Pack {
            input_dir,
            output,
            no_sign,
            keys_dir,
            build_id,
        } => pack_command(&input_dir, &output, no_sign, &keys_dir, build_id),
        Command::Verify { package, keys_dir } => verify_command(&package, &keys_dir),
        Command::Info { package } => info_command(&package),
        Command::Keygen { output_dir } => keygen_command(&output_dir),
    };

    if let Err(error) = result {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn convert_command(input: &Path, output: &Path) -> Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let document: toml::Value = text
        .parse()
        .with_context(|| format!("parsing {}", input.display()))?;
    let tree = convert::lower(document)?;

    let mut diag = Diagnostics::new();
    let config = ProgramConfig::from_tree(&tree, &mut diag)?;
    let bytes = config.to_bytes()?;

    create_parent_dir(output)?;
    fs::write(output, &bytes).with_context(|| format!("writing {}", output.display()))?;

    print_warnings(&diag);
    println!("wrote {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}

fn pack_command(
    input_dir: &Path,
    output: &Path,
    no_sign: bool,
    keys_dir: &Path,
    build_id: Option<u32>,
) -> Result<()> {
    let config_path = input_dir.join("program_config.bin");
    let config =
        fs::read(&config_path).with_context(|| format!("reading {}", config_path.display()))?;

    let mut diag = Diagnostics::new();
    let mut builder = PackageBuilder::new(config)?;

    let bitstream_dir = input_dir.join("bitstreams");
    let mut bitstream_count = 0;
    for (kind, file_name) in &BITSTREAM_FILES {
        let path = bitstream_dir.join(file_name);
        if !path.exists() {
            continue;
        }

        let data = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        builder.add_artifact(*kind, data)?;
        bitstream_count += 1;
    }
    if bitstream_count == 0 {
        bail!("no bitstreams found in {}", bitstream_dir.display());
    }

    let public_key = if no_sign {
        None
    } else {
        let keys = SigningKeys::load(
            &keys_dir.join(PRIVATE_KEY_FILE),
            &keys_dir.join(PUBLIC_KEY_FILE),
            &mut diag,
        )
        .context("loading signing keys (pass --no-sign to build an unsigned package)")?;
        let key = *keys.verifying_key();
        builder.sign_with(keys);
        Some(key)
    };

    if let Some(build_id) = build_id {
        builder.set_build_id(build_id);
    }

    let package = builder.build()?;

    // Prove the invariants of the fresh image before it touches the disk.
    PackageReader::new(&package)?.verify(public_key.as_ref(), &mut diag)?;

    create_parent_dir(output)?;
    fs::write(output, &package).with_context(|| format!("writing {}", output.display()))?;

    print_warnings(&diag);
    println!(
        "wrote {} ({} bytes, {} bitstream{}{})",
        output.display(),
        package.len(),
        bitstream_count,
        if bitstream_count == 1 { "" } else { "s" },
        if no_sign { "" } else { ", signed" },
    );
    Ok(())
}

fn verify_command(package_path: &Path, keys_dir: &Path) -> Result<()> {
    let bytes =
        fs::read(package_path).with_context(|| format!("reading {}", package_path.display()))?;
    let reader = PackageReader::new(&bytes)?;

    let public_key = if reader.is_signed() {
        let path = keys_dir.join(PUBLIC_KEY_FILE);
        Some(
            load_verifying_key(&path)
                .with_context(|| format!("loading the trusted public key {}", path.display()))?,
        )
    } else {
        None
    };

    let mut diag = Diagnostics::new();
    reader.verify(public_key.as_ref(), &mut diag)?;

    print_warnings(&diag);
    println!(
        "{}: OK ({} payloads{})",
        package_path.display(),
        reader.toc_count(),
        if reader.is_signed() { ", signed" } else { "" },
    );
    Ok(())
}

fn info_command(package_path: &Path) -> Result<()> {
    let bytes =
        fs::read(package_path).with_context(|| format!("reading {}", package_path.display()))?;
    let reader = PackageReader::new(&bytes)?;

    let (major, minor) = reader.version();
    let mut header = ListingFormatter::new(2);
    header.add("Magic", format!("0x{:08x}", reader.magic()));
    header.add("Version", format!("{major}.{minor}"));
    header.add("Header size", format!("{} bytes", reader.header_size()));
    header.add("File size", format!("{} bytes", reader.file_size()));
    header.add(
        "Flags",
        format!(
            "0x{:04x}{}",
            reader.flags(),
            if reader.is_signed() { " (signed)" } else { "" }
        ),
    );
    header.add("TOC entries", reader.toc_count());
    header.add("Package SHA-256", hex::encode(reader.package_sha256()));
    println!("Package header:");
    print!("{header}");

    let mut table = new_table(vec!["#", "Type", "Offset", "Size", "SHA-256"]);
    for entry in reader.toc()? {
        let kind = match entry.kind() {
            Some(kind) => kind.name().to_string(),
            None => format!("unknown ({})", entry.kind_raw()),
        };
        table.add_row(vec![
            entry.index().to_string(),
            kind,
            entry.offset().to_string(),
            entry.size().to_string(),
            format!("{}..", hex::encode(&entry.sha256()[..8])),
        ]);
    }
    println!();
    println!("{table}");

    for entry in reader.toc()? {
        match entry.kind() {
            Some(EntryKind::Config) => print_config(&ConfigReader::new(entry.payload()?)?)?,
            Some(EntryKind::SignedDescriptor) => print_descriptor(entry.payload()?)?,
            _ => {}
        }
    }

    Ok(())
}

fn print_config(config: &ConfigReader<'_>) -> Result<()> {
    let version = config.version();
    let (min_major, min_minor) = config.abi_min();
    let (max_major, max_minor) = config.abi_max();

    let mut listing = ListingFormatter::new(2);
    listing.add("Program id", config.program_id()?);
    listing.add("Name", config.program_name()?);
    listing.add(
        "Version",
        format!("{}.{}.{}", version.major, version.minor, version.patch),
    );
    listing.add(
        "ABI",
        format!(">={min_major}.{min_minor},<{max_major}.{max_minor}"),
    );
    listing.add("Hardware mask", format!("0x{:02x}", config.hw_mask()));
    listing.add(
        "Core",
        match config.core() {
            Some(core) => format!("{core:?}"),
            None => format!("unknown ({})", config.core_raw()),
        },
    );
    listing.add("Author", config.author()?);
    listing.add("License", config.license()?);
    listing.add("Category", config.category()?);
    listing.add("Description", config.description()?);
    listing.add("URL", config.url()?);
    listing.add("Parameters", config.parameter_count());
    println!();
    println!("Program configuration:");
    print!("{listing}");

    if config.parameter_count() == 0 {
        return Ok(());
    }

    let mut table = new_table(vec!["#", "Name", "Id", "Mode", "Range", "Initial", "Labels"]);
    for index in 0..usize::from(config.parameter_count()) {
        let parameter = match config.parameter(index) {
            Some(parameter) => parameter,
            None => break,
        };

        let labels = (0..usize::from(parameter.value_label_count()))
            .filter_map(|label| parameter.value_label(label))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");
        table.add_row(vec![
            index.to_string(),
            parameter.name_label()?.to_string(),
            match parameter.id() {
                Some(id) => format!("{id:?}"),
                None => format!("unknown ({})", parameter.id_raw()),
            },
            parameter.control_mode().to_string(),
            format!("{}..={}", parameter.min_value(), parameter.max_value()),
            parameter.initial_value().to_string(),
            labels,
        ]);
    }
    println!();
    println!("{table}");

    Ok(())
}

fn print_descriptor(payload: &[u8]) -> Result<()> {
    let mut diag = Diagnostics::new();
    let descriptor = SignedDescriptor::from_bytes(payload, &mut diag)?;
    print_warnings(&diag);

    let mut listing = ListingFormatter::new(2);
    listing.add("Config SHA-256", hex::encode(descriptor.config_sha256));
    listing.add("Build id", descriptor.build_id);
    listing.add("Flags", format!("0x{:08x}", descriptor.flags));
    listing.add("Artifacts", descriptor.artifacts.len());
    println!();
    println!("Signed descriptor:");
    print!("{listing}");

    for (kind, digest) in &descriptor.artifacts {
        println!("    {} {}", kind.name(), hex::encode(digest));
    }

    Ok(())
}

fn keygen_command(output_dir: &Path) -> Result<()> {
    let private_path = output_dir.join(PRIVATE_KEY_FILE);
    let public_path = output_dir.join(PUBLIC_KEY_FILE);

    if private_path.exists() || public_path.exists() {
        bail!(
            "key files already exist in {}; refusing to overwrite them",
            output_dir.display()
        );
    }

    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let signing = SigningKey::generate(&mut OsRng);
    fs::write(&private_path, signing.to_bytes())
        .with_context(|| format!("writing {}", private_path.display()))?;
    restrict_permissions(&private_path)?;
    fs::write(&public_path, signing.verifying_key().to_bytes())
        .with_context(|| format!("writing {}", public_path.display()))?;

    println!("wrote {}", private_path.display());
    println!("wrote {}", public_path.display());
    println!("keep the private key out of version control");
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("restricting permissions of {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);

    table
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    Ok(())
}

fn print_warnings(diag: &Diagnostics) {
    for warning in diag.warnings() {
        eprintln!("warning: {warning}");
    }
}
