use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_parser, Arg, ArgAction,
    ArgMatches, Command,
};
use colored::Colorize;
use std::path::PathBuf;
use stratum::{config::Layout, preview::preview_as_tree, Project};

// The CLI layer should only parse inputs and forward them to library code.
fn main() -> miette::Result<()> {
    let matches = Command::new(crate_name!())
        .about(crate_description!())
        .author(crate_authors!())
        .version(crate_version!())
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("root")
                .short('C')
                .long("root")
                .help("Project directory holding the manifest, blocks and atoms")
                .value_parser(value_parser!(PathBuf))
                .default_value(".")
                .global(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Layout file to use instead of <root>/stratum.toml")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("out")
                .long("out")
                .help("Output directory, overriding the layout")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(
            Command::new("build")
                .about("Builds templates into the output directory")
                .arg(
                    Arg::new("templates")
                        .help("Template ids to build (default: all)")
                        .num_args(0..),
                )
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .help("Number of templates to build in parallel")
                        .value_parser(value_parser!(usize))
                        .default_value("1"),
                ),
        )
        .subcommand(
            Command::new("plan")
                .about("Shows the tree a template would produce, without writing it")
                .arg(Arg::new("template").help("template id").required(true)),
        )
        .subcommand(Command::new("list").about("Lists the templates declared in the manifest"))
        .get_matches();

    init_logging(matches.get_flag("verbose"));

    let project = stratum::load_project(layout_from(&matches)?)?;

    match matches.subcommand() {
        Some(("build", args)) => handle_build(&project, args),
        Some(("plan", args)) => handle_plan(&project, args),
        Some(("list", _)) => {
            handle_list(&project);
            Ok(())
        }
        _ => unreachable!(),
    }
}

fn init_logging(is_verbose: bool) {
    let default_filter = if is_verbose { "debug" } else { "warn" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn layout_from(matches: &ArgMatches) -> miette::Result<Layout> {
    let root = matches
        .get_one::<PathBuf>("root")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    let mut layout = match matches.get_one::<PathBuf>("config") {
        Some(config) => Layout::from_file(config),
        None => Layout::discover(&root),
    }
    .map_err(stratum::StratumError::from)?;

    if let Some(out) = matches.get_one::<PathBuf>("out") {
        layout.output = out.clone();
    }

    Ok(layout)
}

fn handle_build(project: &Project, args: &ArgMatches) -> miette::Result<()> {
    let ids: Vec<String> = args
        .get_many::<String>("templates")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let jobs = args.get_one::<usize>("jobs").copied().unwrap_or(1);

    let report = project.build(&ids, jobs)?;

    report.print();

    if report.has_failures() {
        miette::bail!("{} of {} templates failed", report.failed(), report.results.len());
    }

    Ok(())
}

fn handle_plan(project: &Project, args: &ArgMatches) -> miette::Result<()> {
    let id = args
        .get_one::<String>("template")
        .expect("template is a required argument");

    let tree = project.plan(id)?;

    preview_as_tree(&tree, id);

    Ok(())
}

fn handle_list(project: &Project) {
    if let Some(release) = &project.manifest.release {
        println!("release {}", release.bold());
    }

    for spec in &project.manifest.templates {
        println!(
            "{} {} {} [{}]",
            spec.id.green(),
            spec.language.cyan(),
            spec.size,
            spec.blocks.join(", ")
        );
    }
}
