use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use troupe_backend::generation::TurnKind;

#[derive(Parser)]
#[command(name = "troupe")]
#[command(version)]
#[command(about = "Drive a group chat of AI characters: pick who speaks, then let them speak in turn")]
pub struct Args {
    /// Config file to use instead of troupe_config.toml next to the executable
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve who would speak for one trigger without generating anything
    Activate(TurnArgs),

    /// Run reply cycles through the scripted generator and print engine events
    Simulate {
        #[command(flatten)]
        turn: TurnArgs,

        /// Number of reply cycles to run
        #[arg(long, default_value = "1")]
        cycles: u32,

        /// Delay of the scripted generator per reply, in milliseconds
        #[arg(long, default_value = "50")]
        delay_ms: u64,

        /// Deliver replies word by word, as a streaming backend would
        #[arg(long)]
        streaming: bool,

        /// Treat the backend as multi-part (multigen) generation
        #[arg(long)]
        multigen: bool,

        /// Hand the group over to auto mode after the scripted cycles
        #[arg(long)]
        auto: bool,

        /// How long auto mode may keep the group talking, in seconds
        #[arg(long, default_value = "10")]
        auto_for_secs: u64,
    },
}

#[derive(ClapArgs)]
pub struct TurnArgs {
    /// Scenario file (TOML): characters, group, chat history
    pub scenario: PathBuf,

    /// Kind of trigger
    #[arg(long, value_enum, default_value = "normal")]
    pub kind: KindArg,

    /// Text the user just sent with the trigger
    #[arg(long)]
    pub input: Option<String>,

    /// Character id that must speak, bypassing activation
    #[arg(long)]
    pub force: Option<String>,

    /// Seed for activation rolls
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Normal,
    Auto,
    Swipe,
    Continue,
    Impersonate,
    Quiet,
}

impl From<KindArg> for TurnKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Normal => TurnKind::Normal,
            KindArg::Auto => TurnKind::AutoTrigger,
            KindArg::Swipe => TurnKind::Swipe,
            KindArg::Continue => TurnKind::Continue,
            KindArg::Impersonate => TurnKind::Impersonate,
            KindArg::Quiet => TurnKind::Quiet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_parses_minimal() {
        let args = Args::parse_from(["troupe", "activate", "tavern.toml"]);
        assert!(args.config.is_none());
        let Command::Activate(turn) = args.command else {
            panic!("expected activate");
        };
        assert_eq!(turn.scenario, PathBuf::from("tavern.toml"));
        assert_eq!(turn.kind, KindArg::Normal);
        assert!(turn.input.is_none());
        assert!(turn.seed.is_none());
    }

    #[test]
    fn simulate_parses_all_flags() {
        let args = Args::parse_from([
            "troupe",
            "simulate",
            "tavern.toml",
            "--kind",
            "swipe",
            "--cycles",
            "3",
            "--streaming",
            "--seed",
            "42",
            "--config",
            "custom.toml",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("custom.toml")));
        let Command::Simulate {
            turn,
            cycles,
            delay_ms,
            streaming,
            multigen,
            auto,
            ..
        } = args.command
        else {
            panic!("expected simulate");
        };
        assert_eq!(turn.kind, KindArg::Swipe);
        assert_eq!(turn.seed, Some(42));
        assert_eq!(cycles, 3);
        assert_eq!(delay_ms, 50);
        assert!(streaming);
        assert!(!multigen);
        assert!(!auto);
    }

    #[test]
    fn kind_maps_onto_turn_kind() {
        assert_eq!(TurnKind::from(KindArg::Auto), TurnKind::AutoTrigger);
        assert_eq!(TurnKind::from(KindArg::Quiet), TurnKind::Quiet);
    }

    #[test]
    fn missing_scenario_is_rejected() {
        assert!(Args::try_parse_from(["troupe", "activate"]).is_err());
    }
}
