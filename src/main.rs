use unknot::linearize::{BatchReport, Linearizer, MethodOutcome, Settings};
use unknot::listing;

use clap::{Arg, ArgAction, Command};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::{fmt, fs, io};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use walkdir::WalkDir;

/// Reasons a whole listing file couldn't be processed
#[derive(Debug)]
enum FileError {
    Io(io::Error),
    Listing(listing::Error),
}

impl From<io::Error> for FileError {
    fn from(err: io::Error) -> FileError {
        FileError::Io(err)
    }
}

impl From<listing::Error> for FileError {
    fn from(err: listing::Error) -> FileError {
        FileError::Listing(err)
    }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::Io(err) => write!(f, "{}", err),
            FileError::Listing(err) => write!(f, "{}", err),
        }
    }
}

fn main() -> io::Result<()> {
    env_logger::init();

    let matches = Command::new("Method body linearizer")
        .version(clap::crate_version!())
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Reorders the blocks of JVM methods to remove jumps, rebuilding exception tables")
        .arg(
            Arg::new("output")
                .long("output-directory")
                .value_name("DIRECTORY")
                .required(false)
                .help("Sets the output directory")
                .default_value("out"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .action(ArgAction::SetTrue)
                .help("Only report what would change, without writing anything"),
        )
        .arg(
            Arg::new("no validate")
                .long("no-validate")
                .action(ArgAction::SetTrue)
                .help("Skips checking the new bodies against the old ones"),
        )
        .arg(
            Arg::new("no loop layout")
                .long("no-loop-layout")
                .action(ArgAction::SetTrue)
                .help("Disables the loop body tie-break when scheduling"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Sets the input listing file or folder")
                .required(true)
                .index(1),
        )
        .get_matches();

    let input_path: PathBuf = match matches.get_one::<String>("INPUT") {
        Some(input) => PathBuf::from(input),
        None => exit(1),
    };
    let output_path: PathBuf = matches
        .get_one::<String>("output")
        .map_or_else(|| PathBuf::from("out"), PathBuf::from);
    let check_only = matches.get_flag("check");

    let mut settings = Settings::new();
    settings.validate = !matches.get_flag("no validate");
    settings.loop_layout_tiebreak = !matches.get_flag("no loop layout");
    let linearizer = Linearizer::new(settings);

    // Find all of the listings
    let listings: Vec<PathBuf> = if input_path.is_file() {
        vec![input_path.clone()]
    } else {
        WalkDir::new(&input_path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|e| e.is_file() && e.extension().map_or(false, |ex| ex == "jasm"))
            .collect()
    };

    let stdout = StandardStream::stdout(ColorChoice::Auto);
    let mut report = BatchReport::default();
    let mut count_error = 0;

    for listing_path in listings {
        log::info!("Linearizing '{}'", listing_path.display());
        let output_file = output_path.join(relative_output(&input_path, &listing_path));

        let mut file_report = BatchReport::default();
        let result = process_file(
            &linearizer,
            &listing_path,
            &output_file,
            check_only,
            &mut file_report,
            &stdout,
        );
        report.merge(&file_report);

        if let Err(err) = result {
            count_error += 1;
            log::error!("{}: {}", listing_path.display(), err);
            print_status(
                &stdout,
                &listing_path.to_string_lossy(),
                Color::Yellow,
                b"ERROR",
            )?;
        }
    }

    log::info!("{}", report);
    println!("{}", report);

    // Exit code
    exit(if count_error > 0 {
        1
    } else if report.methods_failed > 0 {
        2
    } else {
        0
    })
}

/// Linearize every method of one listing, printing a line per method
fn process_file(
    linearizer: &Linearizer,
    listing_path: &Path,
    output_file: &Path,
    check_only: bool,
    report: &mut BatchReport,
    stdout: &StandardStream,
) -> Result<(), FileError> {
    let source = fs::read_to_string(listing_path)?;
    let mut class = listing::parse_class(&source)?;

    let class_name = class.name.clone();
    let outcomes = linearizer.run_class(&mut class, report);
    for (method, outcome) in class.methods.iter().zip(&outcomes) {
        let (color, summary) = match outcome {
            MethodOutcome::Unchanged => (Color::Cyan, b"UNCHANGED".as_ref()),
            MethodOutcome::Changed { mismatches, .. } if !mismatches.is_empty() => {
                (Color::Red, b"MISMATCH".as_ref())
            }
            MethodOutcome::Changed { .. } => (Color::Green, b"CHANGED".as_ref()),
            MethodOutcome::Failed(_) => (Color::Yellow, b"FAILED".as_ref()),
        };
        print_status(stdout, &method.qualified_name(&class_name), color, summary)?;
    }

    if !check_only {
        if let Some(parent) = output_file.parent() {
            fs::create_dir_all(parent)?;
        }
        log::debug!("Writing '{}'", output_file.display());
        fs::write(output_file, listing::print_class(&class))?;
    }

    Ok(())
}

/// Where the output for a listing goes, relative to the output directory
fn relative_output(input_path: &Path, listing_path: &Path) -> PathBuf {
    match listing_path.strip_prefix(input_path) {
        Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
        _ => listing_path
            .file_name()
            .map_or_else(|| PathBuf::from("unnamed.jasm"), PathBuf::from),
    }
}

fn print_status(
    stdout: &StandardStream,
    subject: &str,
    color: Color,
    summary: &[u8],
) -> io::Result<()> {
    let mut s = stdout.lock();
    s.write_all(b" - ")?;
    s.set_color(ColorSpec::new().set_bold(true))?;
    s.write_all(subject.as_bytes())?;
    s.set_color(ColorSpec::new().set_dimmed(true))?;
    s.write_all(b" [")?;
    s.set_color(ColorSpec::new().set_fg(Some(color)))?;
    s.write_all(summary)?;
    s.set_color(ColorSpec::new().set_dimmed(true))?;
    s.write_all(b"]\n")?;
    s.reset()
}
