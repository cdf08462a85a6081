//! Compilation manager: runs the front end over one translation unit at a
//! time. The file-directory cache is shared across units; everything else
//! is rebuilt per file.

use std::rc::Rc;

use cfront::ast::print;
use cfront::diag::{DiagCtx, StderrReporter};
use cfront::driver;
use cfront::file_dir::FileDir;
use cfront::lexer::{Lexeme, TokenData, TokenKind};

use crate::optman::Opts;

pub fn process_file(opts: &Opts, fdir: &Rc<FileDir>, path: &str) -> bool {
    let diag = DiagCtx::new(
        Box::new(StderrReporter::new(Rc::clone(fdir))),
        opts.warn_opts(),
    );
    let config = opts.config(opts.dump_ast);

    if opts.dump_tokens {
        match driver::tokenize(fdir, &diag, &config, path) {
            Ok(tokens) => {
                for tok in &tokens {
                    println!("{}", format_token(tok));
                }
            }
            Err(err) => {
                eprintln!("ccr: {}: {}", path, err);
                return false;
            }
        }
        return diag.error_count() == 0;
    }

    if opts.dump_ast {
        match driver::parse(fdir, &diag, &config, path) {
            Ok(parse) => {
                print!("{}", print::print_translation_unit(&parse.tu));
                parse.ok
            }
            Err(err) => {
                eprintln!("ccr: {}: {}", path, err);
                false
            }
        }
    } else {
        match driver::check(fdir, &diag, &config, path) {
            Ok(_tu) => {
                // The finished AST would be handed to the IR translator
                // here.
                log::debug!("{}: front end ok", path);
                true
            }
            Err(err) => {
                if !matches!(err, cfront::Error::Failed) {
                    eprintln!("ccr: {}: {}", path, err);
                }
                false
            }
        }
    }
}

fn format_token(tok: &Lexeme) -> String {
    let payload = match &tok.data {
        TokenData::None => String::new(),
        TokenData::Id(name) => format!(" {}", name),
        TokenData::Str(s) => format!(" {:?}", s),
        TokenData::Int {
            val,
            has_u,
            has_l,
            has_ll,
        } => {
            let mut suffix = String::new();
            if *has_u {
                suffix.push('u');
            }
            if *has_ll {
                suffix.push_str("ll");
            } else if *has_l {
                suffix.push('l');
            }
            format!(" {}{}", val, suffix)
        }
        TokenData::Float { val, has_f, has_l } => {
            let suffix = if *has_f {
                "f"
            } else if *has_l {
                "l"
            } else {
                ""
            };
            format!(" {}{}", val, suffix)
        }
    };
    let kind = match tok.kind {
        TokenKind::Id => "ID",
        TokenKind::IntLit => "INTLIT",
        TokenKind::FloatLit => "FLOATLIT",
        TokenKind::String => "STRING",
        TokenKind::Eof => "EOF",
        other => other.describe(),
    };
    format!("{}\t{}{}", tok.mark, kind, payload)
}
