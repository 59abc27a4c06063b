use crate::demo::{run_demo, run_render, DemoArgs, RenderArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use clearme::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "ClearMe",
    about = "Run the student clearance service or exercise it from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk one student through every department approval in-process
    Demo(DemoArgs),
    /// Render a clearance form offline from a student profile file
    Render(RenderArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Render(args) => run_render(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["clearme-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn render_requires_a_student_file() {
        assert!(Cli::try_parse_from(["clearme-api", "render"]).is_err());

        let cli = Cli::try_parse_from([
            "clearme-api",
            "render",
            "--student-file",
            "student.json",
            "--signature-image",
            "registrar.png",
        ])
        .expect("parses");
        let Some(Command::Render(args)) = cli.command else {
            panic!("expected render command");
        };
        assert_eq!(args.student_file.to_str(), Some("student.json"));
        assert!(args.signature_image.is_some());
    }

    #[test]
    fn serve_accepts_overrides() {
        let cli = Cli::try_parse_from(["clearme-api", "serve", "--port", "8080"]).expect("parses");
        let Some(Command::Serve(args)) = cli.command else {
            panic!("expected serve command");
        };
        assert_eq!(args.port, Some(8080));
        assert!(args.host.is_none());
    }
}
