//! Command-line options.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
pub enum WarnOpt {
    All,
    Extra,
    Error,
}

#[derive(Parser, Debug)]
#[command(name = "ccr")]
#[command(about = "Hosted C compiler (front end)", long_about = None)]
#[command(version)]
pub struct Opts {
    /// Input source files
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Output path
    #[arg(short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Add a directory to the #include search path
    #[arg(short = 'I', value_name = "DIR", action = ArgAction::Append)]
    pub include: Vec<PathBuf>,

    /// Predefine a macro, NAME or NAME=VALUE
    #[arg(short = 'D', value_name = "NAME[=VALUE]", action = ArgAction::Append)]
    pub define: Vec<String>,

    /// Undefine a macro
    #[arg(short = 'U', value_name = "NAME", action = ArgAction::Append)]
    pub undef: Vec<String>,

    /// Warning options
    #[arg(short = 'W', value_enum, action = ArgAction::Append)]
    pub warn: Vec<WarnOpt>,

    /// Optimization level; accepted but only recorded
    #[arg(short = 'O', value_name = "LEVEL", default_value_t = 0)]
    pub olevel: u8,

    /// Language standard; accepted but only recorded
    #[arg(long = "std", value_name = "STD")]
    pub std: Option<String>,

    /// Dump the lexer's token stream and exit
    #[arg(long = "dump_tokens")]
    pub dump_tokens: bool,

    /// Dump the parsed AST and exit
    #[arg(long = "dump_ast")]
    pub dump_ast: bool,
}

impl Opts {
    pub fn warn_opts(&self) -> cfront::diag::WarnOpts {
        cfront::diag::WarnOpts {
            all: self.warn.contains(&WarnOpt::All),
            extra: self.warn.contains(&WarnOpt::Extra),
            error: self.warn.contains(&WarnOpt::Error),
        }
    }

    pub fn config(&self, keep_parens: bool) -> cfront::driver::Config {
        cfront::driver::Config {
            include_dirs: self.include.clone(),
            defines: self.define.clone(),
            undefs: self.undef.clone(),
            warn_opts: self.warn_opts(),
            keep_parens,
        }
    }
}
