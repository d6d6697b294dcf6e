use crate::assets::ModelSource;
use crate::config::{
    reduce, BaseFinish, ConfigAction, ConfigError, Configuration, PatternMotif, RimFinish,
};
use crate::editor::primitives::PrimitiveShape;
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str =
    "https://pub-0fa84320243249fca31ce0de4238c3e8.r2.dev/MajestyGLB.glb";
pub const DEFAULT_ENVIRONMENT: &str = "env_texture/studio_small_08_1k.hdr";

pub const USAGE: &str = "\
usage:
  lampviz resolve [--base NAME] [--rim NAME] [--pattern NAME] [--all]
  lampviz render  [--base NAME] [--rim NAME] [--pattern NAME] [VIEW OPTIONS]
  lampviz edit    [--settings FILE] [--import PATH]... [--add box|sphere|plane|light]...
                  [--export FILE] [VIEW OPTIONS]

view options:
  --model PATH|URL     lamp asset (default: hosted MajestyGLB.glb)
  --env PATH|URL       environment panorama (.hdr, .jpg, .png)
  --no-env             skip the environment
  --size WxH           viewport size in logical pixels (default 960x540)
  --pixel-ratio N      device pixel ratio (default 1)
  --window             open an interactive window instead of rendering offscreen
  --out FILE           write the final frame as PNG
  --frames N           frame budget while waiting on loads (default 600)";

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("missing command\n{USAGE}")]
    MissingCommand,
    #[error("unknown command '{0}'\n{USAGE}")]
    UnknownCommand(String),
    #[error("unknown option '{option}' for {command}")]
    UnknownOption { command: &'static str, option: String },
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("invalid size '{0}', expected WIDTHxHEIGHT")]
    InvalidSize(String),
    #[error("invalid number for {flag}: '{value}'")]
    InvalidNumber { flag: String, value: String },
    #[error("unknown primitive '{0}', expected box, sphere, plane or light")]
    UnknownPrimitive(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Clone, PartialEq)]
pub struct ViewArgs {
    pub model: Option<ModelSource>,
    pub environment: Option<ModelSource>,
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    pub output: Option<PathBuf>,
    pub max_frames: u32,
    /// Run interactively in a window until it is closed.
    pub window: bool,
}

impl Default for ViewArgs {
    fn default() -> Self {
        Self {
            model: Some(ModelSource::parse(DEFAULT_MODEL)),
            environment: Some(ModelSource::parse(DEFAULT_ENVIRONMENT)),
            width: 960,
            height: 540,
            pixel_ratio: 1.0,
            output: None,
            max_frames: 600,
            window: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddItem {
    Light,
    Primitive(PrimitiveShape),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Resolve { config: Configuration, all: bool },
    Render { config: Configuration, view: ViewArgs },
    Edit {
        settings: Option<PathBuf>,
        imports: Vec<String>,
        additions: Vec<AddItem>,
        export: Option<PathBuf>,
        view: ViewArgs,
    },
}

/// Finish flags are applied through the reducer, rim first, so the result
/// always satisfies the base/rim constraint.
#[derive(Default)]
struct FinishFlags {
    base: Option<BaseFinish>,
    rim: Option<RimFinish>,
    pattern: Option<PatternMotif>,
}

impl FinishFlags {
    fn configuration(&self) -> Configuration {
        let mut config = Configuration::default();
        if let Some(rim) = self.rim {
            config = reduce(config, ConfigAction::SelectRim(rim));
        }
        if let Some(base) = self.base {
            let next = reduce(config, ConfigAction::SelectBase(base));
            if next.base != base {
                log::warn!(
                    "{} is not offered with {}, keeping {}",
                    base.display_name(),
                    config.rim.key(),
                    config.base.display_name()
                );
            }
            config = next;
        }
        if let Some(pattern) = self.pattern {
            config = reduce(config, ConfigAction::SelectPattern(pattern));
        }
        config
    }
}

struct Args<'a> {
    items: std::slice::Iter<'a, String>,
}

impl<'a> Args<'a> {
    fn value(&mut self, flag: &str) -> Result<&'a str> {
        self.items
            .next()
            .map(String::as_str)
            .ok_or_else(|| CliError::MissingValue(flag.to_string()))
    }
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| CliError::InvalidNumber {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| CliError::InvalidSize(value.to_string()))?;
    match (w.parse::<u32>(), h.parse::<u32>()) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(CliError::InvalidSize(value.to_string())),
    }
}

fn parse_add(value: &str) -> Result<AddItem> {
    match value.to_ascii_lowercase().as_str() {
        "light" => Ok(AddItem::Light),
        other => PrimitiveShape::ALL
            .into_iter()
            .find(|shape| shape.label().eq_ignore_ascii_case(other))
            .map(AddItem::Primitive)
            .ok_or_else(|| CliError::UnknownPrimitive(value.to_string())),
    }
}

fn compact(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Finish names with spaces are awkward on a shell, so `CopperRing`,
/// `copper-ring` and `"Copper Ring"` all resolve to the same finish.
fn lookup<T>(value: &str, all: &[T], name: fn(T) -> &'static str) -> Result<T>
where
    T: Copy + std::str::FromStr<Err = ConfigError>,
{
    let wanted = compact(value);
    match all.iter().copied().find(|item| compact(name(*item)) == wanted) {
        Some(item) => Ok(item),
        None => Ok(value.parse()?),
    }
}

fn parse_finish(flags: &mut FinishFlags, flag: &str, args: &mut Args<'_>) -> Result<bool> {
    match flag {
        "--base" => {
            let value = args.value(flag)?;
            flags.base = Some(lookup(value, &BaseFinish::ALL, BaseFinish::display_name)?);
        }
        "--rim" => flags.rim = Some(lookup(args.value(flag)?, &RimFinish::ALL, RimFinish::key)?),
        "--pattern" => {
            let value = args.value(flag)?;
            flags.pattern = Some(lookup(value, &PatternMotif::ALL, PatternMotif::key)?);
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse_view(view: &mut ViewArgs, flag: &str, args: &mut Args<'_>) -> Result<bool> {
    match flag {
        "--model" => view.model = Some(ModelSource::parse(args.value(flag)?)),
        "--env" => view.environment = Some(ModelSource::parse(args.value(flag)?)),
        "--no-env" => view.environment = None,
        "--size" => (view.width, view.height) = parse_size(args.value(flag)?)?,
        "--pixel-ratio" => view.pixel_ratio = parse_number(flag, args.value(flag)?)?,
        "--out" => view.output = Some(PathBuf::from(args.value(flag)?)),
        "--frames" => view.max_frames = parse_number(flag, args.value(flag)?)?,
        "--window" => view.window = true,
        _ => return Ok(false),
    }
    Ok(true)
}

/// Parse arguments without the program name.
pub fn parse(args: &[String]) -> Result<Command> {
    let (command, rest) = args.split_first().ok_or(CliError::MissingCommand)?;
    let mut args = Args { items: rest.iter() };
    let mut finishes = FinishFlags::default();
    let mut view = ViewArgs::default();

    match command.as_str() {
        "help" | "-h" | "--help" => Ok(Command::Help),
        "resolve" => {
            let mut all = false;
            while let Some(flag) = args.items.next() {
                if flag == "--all" {
                    all = true;
                } else if !parse_finish(&mut finishes, flag, &mut args)? {
                    return Err(CliError::UnknownOption {
                        command: "resolve",
                        option: flag.clone(),
                    });
                }
            }
            Ok(Command::Resolve {
                config: finishes.configuration(),
                all,
            })
        }
        "render" => {
            while let Some(flag) = args.items.next() {
                let known = parse_finish(&mut finishes, flag, &mut args)?
                    || parse_view(&mut view, flag, &mut args)?;
                if !known {
                    return Err(CliError::UnknownOption {
                        command: "render",
                        option: flag.clone(),
                    });
                }
            }
            Ok(Command::Render {
                config: finishes.configuration(),
                view,
            })
        }
        "edit" => {
            let mut settings = None;
            let mut imports = Vec::new();
            let mut additions = Vec::new();
            let mut export = None;
            while let Some(flag) = args.items.next() {
                match flag.as_str() {
                    "--settings" => settings = Some(PathBuf::from(args.value(flag)?)),
                    "--import" => imports.push(args.value(flag)?.to_string()),
                    "--add" => additions.push(parse_add(args.value(flag)?)?),
                    "--export" => export = Some(PathBuf::from(args.value(flag)?)),
                    _ => {
                        if !parse_view(&mut view, flag, &mut args)? {
                            return Err(CliError::UnknownOption {
                                command: "edit",
                                option: flag.clone(),
                            });
                        }
                    }
                }
            }
            Ok(Command::Edit {
                settings,
                imports,
                additions,
                export,
                view,
            })
        }
        other => Err(CliError::UnknownCommand(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn resolve_applies_rim_before_base() {
        let line = "resolve --base Copper --rim CopperRing --pattern Star";
        let command = parse(&args(line)).unwrap();
        let Command::Resolve { config, all } = command else {
            panic!("expected resolve");
        };
        assert!(!all);
        assert_eq!(config.base, BaseFinish::Copper);
        assert_eq!(config.rim, RimFinish::CopperRing);
        assert_eq!(config.pattern, PatternMotif::Star);
    }

    #[test]
    fn disallowed_base_keeps_previous() {
        let Command::Resolve { config, .. } = parse(&args("resolve --base Copper")).unwrap() else {
            panic!("expected resolve");
        };
        assert!(config.is_valid());
        assert_eq!(config.base, Configuration::default().base);
    }

    #[test]
    fn render_reads_view_options() {
        let line = "render --size 320x200 --pixel-ratio 2 --out frame.png --no-env --model a.glb";
        let command = parse(&args(line)).unwrap();
        let Command::Render { view, .. } = command else {
            panic!("expected render");
        };
        assert_eq!((view.width, view.height), (320, 200));
        assert_eq!(view.pixel_ratio, 2.0);
        assert_eq!(view.output, Some(PathBuf::from("frame.png")));
        assert_eq!(view.environment, None);
        assert_eq!(view.model, Some(ModelSource::parse("a.glb")));
        assert!(!view.window);
    }

    #[test]
    fn window_flag_selects_interactive_mode() {
        let Command::Edit { view, .. } = parse(&args("edit --window --no-env")).unwrap() else {
            panic!("expected edit");
        };
        assert!(view.window);
        let Command::Render { view, .. } = parse(&args("render --window")).unwrap() else {
            panic!("expected render");
        };
        assert!(view.window);
    }

    #[test]
    fn edit_collects_repeated_flags() {
        let line = "edit --add box --add Light --import a.glb --import b.fbx --export out.json";
        let command = parse(&args(line)).unwrap();
        let Command::Edit {
            additions,
            imports,
            export,
            ..
        } = command
        else {
            panic!("expected edit");
        };
        assert_eq!(additions, vec![AddItem::Primitive(PrimitiveShape::Box), AddItem::Light]);
        assert_eq!(imports, vec!["a.glb".to_string(), "b.fbx".to_string()]);
        assert_eq!(export, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn errors_are_reported() {
        assert!(matches!(parse(&[]), Err(CliError::MissingCommand)));
        assert!(matches!(parse(&args("paint")), Err(CliError::UnknownCommand(_))));
        assert!(matches!(parse(&args("render --size 12")), Err(CliError::InvalidSize(_))));
        assert!(matches!(parse(&args("render --out")), Err(CliError::MissingValue(_))));
        assert!(matches!(parse(&args("resolve --rim Bronze")), Err(CliError::Config(_))));
        let line = "resolve --base red-metallic --rim silver_ring";
        let Command::Resolve { config, .. } = parse(&args(line)).unwrap() else {
            panic!("expected resolve");
        };
        assert_eq!(config.base, BaseFinish::RedMetallic);
        assert_eq!(config.rim, RimFinish::SilverRing);
        assert!(matches!(parse(&args("edit --add cone")), Err(CliError::UnknownPrimitive(_))));
        assert!(matches!(
            parse(&args("resolve --out x")),
            Err(CliError::UnknownOption { command: "resolve", .. })
        ));
    }
}
