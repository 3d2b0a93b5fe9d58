use anyhow::{Context, Result, anyhow, bail};
use plateflow::{
    about, bundle::Bundle, colony, condense, equimolar, input::DesignBundle, instructions, pipeline, redo,
    registry::TypedSequence, settings::CompilerSettings, table,
};
use std::collections::HashMap;
use std::{env, fs};

const DEFAULT_BUNDLE_PATH: &str = "workflow.zip";

fn usage() {
    eprintln!(
        "Usage:\n  \
  plateflow_cli --version\n  \
  plateflow_cli compile DESIGN... [--plasmids DIR] [--config FILE] [--out ZIP] [--workflow JSON]\n  \
  plateflow_cli condense DESIGN... --out FILE\n  \
  plateflow_cli equimolar ASSEMBLY.csv QUANT.csv [--config FILE] --out ZIP\n  \
  plateflow_cli redo-pcr RESULTS.csv TRIAL --out DIR\n  \
  plateflow_cli consolidate TRIAL.csv... --out DIR\n  \
  plateflow_cli instructions METHOD WORKSHEET.csv\n  \
  plateflow_cli colony-pcr PLATING.csv PLASMIDS.csv --forward SEQ --reverse SEQ --user NAME --date YYMMDD [--config FILE] --out DIR\n\n  \
  DESIGN may be a CSV file (optionally .gz), a directory or a zip archive.\n  \
  Set RUST_LOG=debug for step-by-step logging."
    );
}

/// Positional arguments and `--name value` options after the command.
struct Args {
    positional: Vec<String>,
    options: HashMap<String, String>,
}

impl Args {
    fn parse(args: &[String]) -> Result<Self> {
        let mut positional = vec![];
        let mut options = HashMap::new();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if let Some(name) = arg.strip_prefix("--") {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("Missing value for --{name}"))?;
                options.insert(name.to_string(), value.clone());
            } else {
                positional.push(arg.clone());
            }
        }
        Ok(Self { positional, options })
    }

    fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.option(name).ok_or_else(|| {
            usage();
            anyhow!("Missing --{name}")
        })
    }

    fn settings(&self) -> Result<CompilerSettings> {
        match self.option("config") {
            Some(path) => CompilerSettings::load_from_path(path)
                .with_context(|| format!("Could not load settings from '{path}'")),
            None => Ok(CompilerSettings::default()),
        }
    }
}

fn read(path: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Could not read '{path}'"))
}

fn write_zip(bundle: &Bundle, path: &str) -> Result<()> {
    let bytes = bundle.to_zip()?;
    fs::write(path, bytes).with_context(|| format!("Could not write '{path}'"))?;
    println!("Wrote {} files to '{path}'", bundle.len());
    Ok(())
}

fn write_dir(bundle: &Bundle, dir: &str) -> Result<()> {
    bundle
        .write_to_dir(dir)
        .with_context(|| format!("Could not write into '{dir}'"))?;
    println!("Wrote {} files to '{dir}'", bundle.len());
    Ok(())
}

fn load_designs(args: &Args) -> Result<DesignBundle> {
    if args.positional.is_empty() {
        usage();
        bail!("Missing design file");
    }
    let mut designs = DesignBundle::default();
    for path in &args.positional {
        designs
            .add_path(path)
            .with_context(|| format!("Could not load designs from '{path}'"))?;
    }
    if let Some(dir) = args.option("plasmids") {
        let maps = DesignBundle::from_path(dir)
            .with_context(|| format!("Could not load plasmid maps from '{dir}'"))?;
        designs.plasmid_maps.extend(maps.plasmid_maps);
    }
    Ok(designs)
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .init();
    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let argv: Vec<String> = env::args().collect();
    if argv.len() <= 1 {
        usage();
        bail!("Missing command");
    }
    if argv.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", about::version_cli_text());
        return Ok(());
    }
    let command = argv[1].as_str();
    let args = Args::parse(&argv[2..])?;

    match command {
        "compile" => {
            let settings = args.settings()?;
            let designs = load_designs(&args)?;
            let (bundle, record) = pipeline::compile(&designs, &settings, None)?;
            write_zip(&bundle, args.option("out").unwrap_or(DEFAULT_BUNDLE_PATH))?;
            if let Some(path) = args.option("workflow") {
                fs::write(path, record.to_json()?).with_context(|| format!("Could not write '{path}'"))?;
                println!("Wrote workflow record to '{path}'");
            }
            Ok(())
        }
        "condense" => {
            let designs = load_designs(&args)?.parse_designs()?;
            for (i, design) in designs.iter().enumerate() {
                design.validate_references(i)?;
            }
            let condensed = condense::condense(&designs)?;
            let out = args.required("out")?;
            fs::write(out, condensed.to_csv()?).with_context(|| format!("Could not write '{out}'"))?;
            println!("Condensed {} designs into '{out}'", designs.len());
            Ok(())
        }
        "equimolar" => {
            let [assembly, quant] = args.positional.as_slice() else {
                usage();
                bail!("equimolar requires: ASSEMBLY.csv QUANT.csv");
            };
            let settings = args.settings()?;
            let bundle = equimolar::standalone(&read(assembly)?, &read(quant)?, &settings.equimolar)?;
            write_zip(&bundle, args.required("out")?)
        }
        "redo-pcr" => {
            let [results, trial] = args.positional.as_slice() else {
                usage();
                bail!("redo-pcr requires: RESULTS.csv TRIAL");
            };
            let trial: u32 = trial.parse().with_context(|| format!("Invalid trial '{trial}'"))?;
            let mut store = redo::WorksheetStore::default();
            store.insert(redo::ANALYZE_STEP, trial, redo::PCR_RESULTS, read(results)?);
            let bundle = redo::create_pcr_redo(&store, trial)?;
            write_dir(&bundle, args.required("out")?)
        }
        "consolidate" => {
            if args.positional.is_empty() {
                usage();
                bail!("consolidate requires at least one trial worksheet");
            }
            let mut store = redo::WorksheetStore::default();
            for (i, path) in args.positional.iter().enumerate() {
                store.insert(redo::CONSOLIDATE_STEP, i as u32 + 1, redo::PCR_RESULTS, read(path)?);
            }
            let bundle = redo::consolidate_from_store(&store, args.positional.len() as u32)?;
            write_dir(&bundle, args.required("out")?)
        }
        "instructions" => {
            let [method, worksheet] = args.positional.as_slice() else {
                usage();
                bail!("instructions requires: METHOD WORKSHEET.csv");
            };
            let method: instructions::TransferMethod = method.parse()?;
            let transfers = instructions::from_csv(method, &read(worksheet)?)?;
            print!("{}", table::to_csv(&transfers)?);
            Ok(())
        }
        "colony-pcr" => {
            let [plating, plasmids] = args.positional.as_slice() else {
                usage();
                bail!("colony-pcr requires: PLATING.csv PLASMIDS.csv");
            };
            let settings = args.settings()?;
            let plating: Vec<colony::PlatingRow> = table::from_csv(&read(plating)?)?;
            let plasmids: Vec<TypedSequence> = table::from_csv(&read(plasmids)?)?;
            let picking = colony::picking_worksheet(&plating, settings.picking.colonies_per_construct);
            let setup = colony::ColonyPcrSetup {
                forward_primer: args.required("forward")?,
                reverse_primer: args.required("reverse")?,
                username: args.required("user")?,
                date: args.required("date")?,
                reaction_volume_ul: colony::DEFAULT_REACTION_VOLUME_UL,
            };
            let mut bundle = colony::colony_pcr(&colony::glycerol_stocks(&picking), &plasmids, &setup)?;
            bundle.insert("picking_worksheet.csv", table::to_csv(&picking)?);
            write_dir(&bundle, args.required("out")?)
        }
        _ => {
            usage();
            bail!("Unknown command '{command}'")
        }
    }
}
