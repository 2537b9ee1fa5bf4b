use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use movnt_harness::matrix::write_matrix_json;
use movnt_harness::runner::SubprocessRunner;
use movnt_harness::{execute_matrix, CaseStatus, HostProbe, TestMatrix};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct CliConfig {
    execute: bool,
    binary: Option<PathBuf>,
    scratch_dir: Option<PathBuf>,
    case: Option<String>,
    output: Option<PathBuf>,
}

fn print_help() {
    let help = "\
movnt_matrix — non-temporal-store alignment test matrix

USAGE:
    cargo run -p movnt-harness --bin movnt_matrix -- [OPTIONS]

MODES:
    default               Emit the matrix definition as JSON (plan mode)
    --execute             Run the matrix against a subject binary

OPTIONS:
    --binary <PATH>       Subject binary (required with --execute)
    --scratch-dir <PATH>  Directory for per-case backing files
                          (default: a fresh temporary directory)
    --case <ID>           Restrict the run to one case id
    --output <PATH>       Write output to file (stdout when omitted)
    -h, --help            Show this help
";
    println!("{help}");
}

fn parse_args(args: &[String]) -> Result<CliConfig, String> {
    let mut config = CliConfig {
        execute: false,
        binary: None,
        scratch_dir: None,
        case: None,
        output: None,
    };

    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--execute" => config.execute = true,
            "--binary" => {
                index += 1;
                if index >= args.len() {
                    return Err("--binary requires a value".to_owned());
                }
                config.binary = Some(PathBuf::from(&args[index]));
            }
            "--scratch-dir" => {
                index += 1;
                if index >= args.len() {
                    return Err("--scratch-dir requires a value".to_owned());
                }
                config.scratch_dir = Some(PathBuf::from(&args[index]));
            }
            "--case" => {
                index += 1;
                if index >= args.len() {
                    return Err("--case requires a value".to_owned());
                }
                config.case = Some(args[index].clone());
            }
            "--output" => {
                index += 1;
                if index >= args.len() {
                    return Err("--output requires a value".to_owned());
                }
                config.output = Some(PathBuf::from(&args[index]));
            }
            "-h" | "--help" => {
                print_help();
                return Err(String::new());
            }
            unknown => return Err(format!("unknown option: {unknown}")),
        }
        index += 1;
    }

    if config.execute && config.binary.is_none() {
        return Err("--execute requires --binary".to_owned());
    }

    Ok(config)
}

fn emit(output: Option<&PathBuf>, payload: &str) -> Result<(), String> {
    if let Some(path) = output {
        std::fs::write(path, payload.as_bytes())
            .map_err(|error| format!("write failed path={} error={error}", path.display()))?;
    } else {
        println!("{payload}");
    }
    Ok(())
}

fn select_cases(matrix: TestMatrix, case: Option<&str>) -> Result<TestMatrix, String> {
    match case {
        None => Ok(matrix),
        Some(id) => {
            let spec = matrix
                .case(id)
                .cloned()
                .ok_or_else(|| format!("unknown case id: {id}"))?;
            Ok(TestMatrix {
                schema_version: matrix.schema_version,
                cases: vec![spec],
            })
        }
    }
}

fn run(args: &[String]) -> Result<bool, String> {
    let config = parse_args(args)?;
    let matrix = TestMatrix::canonical().map_err(|error| error.to_string())?;
    let matrix = select_cases(matrix, config.case.as_deref())?;

    if !config.execute {
        match &config.output {
            Some(path) => write_matrix_json(path, &matrix).map_err(|error| error.to_string())?,
            None => {
                let payload = matrix
                    .to_json()
                    .map_err(|error| format!("matrix serialization failed: {error}"))?;
                println!("{payload}");
            }
        }
        return Ok(true);
    }

    let binary = config
        .binary
        .as_ref()
        .ok_or_else(|| "--execute requires --binary".to_owned())?;
    let host = HostProbe::detect();

    // Keep the tempdir guard alive for the duration of the run.
    let tempdir;
    let scratch_root = match &config.scratch_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|error| format!("scratch dir unusable: {error}"))?;
            dir.clone()
        }
        None => {
            tempdir = tempfile::tempdir().map_err(|error| format!("tempdir failed: {error}"))?;
            tempdir.path().to_path_buf()
        }
    };

    let mut runner = SubprocessRunner::new(binary.clone());
    let summary = execute_matrix(&matrix, &host, &scratch_root, &mut runner)
        .map_err(|error| error.to_string())?;

    let payload = summary
        .to_json()
        .map_err(|error| format!("summary serialization failed: {error}"))?;
    emit(config.output.as_ref(), &payload)?;

    for case in &summary.cases {
        if case.status == CaseStatus::Failed {
            eprintln!("FAILED case={}", case.case_id);
        }
    }
    Ok(summary.all_passed())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) if error.is_empty() => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("ERROR movnt_matrix failed: {error}");
            ExitCode::from(2)
        }
    }
}
