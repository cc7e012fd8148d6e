use super::*;
use clap::CommandFactory;

#[test]
fn verify_cli_args() {
    // Validates the entire command tree: short flag conflicts,
    // duplicate args, and other clap definition errors.
    Cli::command().debug_assert();
}

#[test]
fn migrate_parses_direction_and_flags() {
    let cli = Cli::try_parse_from([
        "stratum", "migrate", "down", "--batch", "3", "--dry-run", "--force",
    ])
    .unwrap();
    match cli.command {
        Commands::Migrate(args) => {
            assert_eq!(args.direction, Direction::Down);
            assert_eq!(args.batch, Some(3));
            assert!(args.dry_run);
            assert!(args.force);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn migrate_rejects_unknown_direction() {
    let err = Cli::try_parse_from(["stratum", "migrate", "sideways"]).unwrap_err();
    assert!(err.to_string().contains("Use \"up\" or \"down\""));
}

#[test]
fn global_flags_work_after_subcommand() {
    let cli = Cli::try_parse_from([
        "stratum",
        "status",
        "--output",
        "json",
        "-p",
        "proj",
        "--migrations-dir",
        "db/migrations",
        "-v",
    ])
    .unwrap();
    assert!(cli.global.verbose);
    assert_eq!(cli.global.project_dir, "proj");
    assert_eq!(cli.global.migrations_dir.as_deref(), Some("db/migrations"));
    assert!(matches!(
        cli.command,
        Commands::Status(StatusArgs {
            output: StatusOutput::Json
        })
    ));
}
