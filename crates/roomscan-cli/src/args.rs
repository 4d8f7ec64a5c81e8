//! Command-line parsing.
//!
//! ```text
//! roomscan analyze [--config PATH] [--compact] <CLOUD.json | ->
//! roomscan synth   [--length M] [--width M] [--height M] [--spacing M]
//!                  [--noise SIGMA] [--seed N] [--no-walls] [--no-ceiling]
//!                  [--box X0,Y0,Z0,X1,Y1,Z1]...
//! roomscan schema
//! roomscan defaults [--config PATH]
//! roomscan init
//! roomscan help
//! ```

use std::path::PathBuf;

use roomscan_types::Point3;

/// Where `analyze` reads the cloud from.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Stdin,
    File(PathBuf),
}

/// Parameters of `roomscan synth`.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthArgs {
    pub length: f32,
    pub width: f32,
    pub height: f32,
    pub spacing: Option<f32>,
    pub noise: Option<f32>,
    pub seed: Option<u64>,
    pub walls: bool,
    pub ceiling: bool,
    pub boxes: Vec<(Point3, Point3)>,
}

impl Default for SynthArgs {
    fn default() -> Self {
        Self {
            length: 4.0,
            width: 3.0,
            height: 2.5,
            spacing: None,
            noise: None,
            seed: None,
            walls: true,
            ceiling: true,
            boxes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Analyze {
        input: Input,
        config: Option<PathBuf>,
        compact: bool,
    },
    Synth(SynthArgs),
    Schema,
    Defaults { config: Option<PathBuf> },
    Init,
    Help,
}

/// Parse everything after the program name.
pub fn parse<I, S>(args: I) -> Result<Command, String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args = args.into_iter().map(Into::into);
    let Some(cmd) = args.next() else {
        return Ok(Command::Help);
    };
    let rest: Vec<String> = args.collect();

    match cmd.as_str() {
        "analyze" => parse_analyze(&rest),
        "synth" => parse_synth(&rest).map(Command::Synth),
        "schema" => no_arguments(&rest, Command::Schema),
        "defaults" => {
            let mut config = None;
            let mut it = rest.iter();
            while let Some(arg) = it.next() {
                match arg.as_str() {
                    "--config" => config = Some(PathBuf::from(value(&mut it, arg)?)),
                    other => return Err(format!("Unexpected argument '{other}'")),
                }
            }
            Ok(Command::Defaults { config })
        }
        "init" => no_arguments(&rest, Command::Init),
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(format!("Unknown command '{other}'")),
    }
}

fn no_arguments(rest: &[String], cmd: Command) -> Result<Command, String> {
    match rest.first() {
        Some(extra) => Err(format!("Unexpected argument '{extra}'")),
        None => Ok(cmd),
    }
}

fn parse_analyze(rest: &[String]) -> Result<Command, String> {
    let mut input = None;
    let mut config = None;
    let mut compact = false;
    let mut it = rest.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(value(&mut it, arg)?)),
            "--compact" => compact = true,
            "-" if input.is_none() => input = Some(Input::Stdin),
            flag if flag.starts_with("--") => return Err(format!("Unknown flag '{flag}'")),
            path if input.is_none() => input = Some(Input::File(PathBuf::from(path))),
            extra => return Err(format!("Unexpected argument '{extra}'")),
        }
    }
    let input = input.ok_or("analyze needs an input file, or '-' for stdin")?;
    Ok(Command::Analyze {
        input,
        config,
        compact,
    })
}

fn parse_synth(rest: &[String]) -> Result<SynthArgs, String> {
    let mut synth = SynthArgs::default();
    let mut it = rest.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--length" => synth.length = number(value(&mut it, arg)?, arg)?,
            "--width" => synth.width = number(value(&mut it, arg)?, arg)?,
            "--height" => synth.height = number(value(&mut it, arg)?, arg)?,
            "--spacing" => synth.spacing = Some(number(value(&mut it, arg)?, arg)?),
            "--noise" => synth.noise = Some(number(value(&mut it, arg)?, arg)?),
            "--seed" => synth.seed = Some(number(value(&mut it, arg)?, arg)?),
            "--no-walls" => synth.walls = false,
            "--no-ceiling" => synth.ceiling = false,
            "--box" => synth.boxes.push(parse_box(value(&mut it, arg)?)?),
            other => return Err(format!("Unknown flag '{other}'")),
        }
    }
    for (name, v) in [
        ("--length", synth.length),
        ("--width", synth.width),
        ("--height", synth.height),
    ] {
        if !(v > 0.0) {
            return Err(format!("{name} must be positive, got {v}"));
        }
    }
    if let Some(s) = synth.spacing
        && !(s > 0.0)
    {
        return Err(format!("--spacing must be positive, got {s}"));
    }
    Ok(synth)
}

fn value<'a>(it: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<&'a str, String> {
    it.next()
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} needs a value"))
}

fn number<T: std::str::FromStr>(raw: &str, flag: &str) -> Result<T, String> {
    raw.parse()
        .map_err(|_| format!("{flag}: '{raw}' is not a valid number"))
}

/// `x0,y0,z0,x1,y1,z1` → two opposite corners.
fn parse_box(raw: &str) -> Result<(Point3, Point3), String> {
    let v = raw
        .split(',')
        .map(|s| number::<f32>(s.trim(), "--box"))
        .collect::<Result<Vec<_>, _>>()?;
    match v.as_slice() {
        [x0, y0, z0, x1, y1, z1] => Ok((Point3::new(*x0, *y0, *z0), Point3::new(*x1, *y1, *z1))),
        _ => Err(format!("--box expects six comma-separated numbers, got {}", v.len())),
    }
}
