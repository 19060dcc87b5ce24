use std::path::PathBuf;

use devguide_tui::app::RunOptions;

const HELP: &str = "DevGuide TUI: learning tracks, languages, terms and community Q&A in the terminal.

  --version, -V          Show version and exit
  --help,    -h          Show this help message
  --config <path>        Read configuration from <path>
  --route <fragment>     Open at a route such as tracks, community or login";

enum Cli {
    Exit,
    Run(RunOptions),
}

fn main() {
    let opts = match parse_args(std::env::args().skip(1)) {
        Ok(Cli::Exit) => return,
        Ok(Cli::Run(opts)) => opts,
        Err(message) => {
            eprintln!("error: {message}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    if let Err(err) = devguide_tui::run(opts) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Cli, String> {
    let mut opts = RunOptions::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("DevGuide TUI {}", devguide_tui::VERSION);
                return Ok(Cli::Exit);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(Cli::Exit);
            }
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                opts.config_file = Some(PathBuf::from(path));
            }
            "--route" => {
                let route = args.next().ok_or("--route needs a fragment")?;
                opts.route = Some(route);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(Cli::Run(opts))
}
