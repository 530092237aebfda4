//! Command-line argument parsing.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use kazana_core::models::{Category, DocumentFilter};

pub const USAGE: &str = "\
Usage: kazana <command> [options]

Commands:
  login [username]                 Log in (password from KAZANA_PASSWORD or prompt)
  signup <username> <email>        Create an account
  logout                           End the session and clear cached data
  status                           Show session and cache state
  list [--category C] [--search Q] [--sort file|category|confidence|uploaded] [--offline]
                                   List documents
  show <id> [--offline]            Show one document's details
  upload <file> [--category C]     Upload a document for classification
  set-category <id> <category>     Change a document's category
  delete <id>                      Delete a document
  help                             Show this message

Categories: tax, identity, medical, real_estate, other";

#[derive(Debug, PartialEq)]
pub enum Command {
    Login { username: Option<String> },
    Signup { username: String, email: String },
    Logout,
    Status,
    List { filter: DocumentFilter, offline: bool },
    Show { id: i64, offline: bool },
    Upload { path: PathBuf, category: Option<Category> },
    SetCategory { id: i64, category: Category },
    Delete { id: i64 },
    Help,
}

pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "login" => {
            expect_at_most(command, rest, 1)?;
            Ok(Command::Login {
                username: rest.first().cloned(),
            })
        }
        "signup" => match rest {
            [username, email] => Ok(Command::Signup {
                username: username.clone(),
                email: email.clone(),
            }),
            _ => bail!("signup expects <username> <email>"),
        },
        "logout" => {
            expect_at_most(command, rest, 0)?;
            Ok(Command::Logout)
        }
        "status" => {
            expect_at_most(command, rest, 0)?;
            Ok(Command::Status)
        }
        "list" | "ls" => parse_list(rest),
        "show" => match rest {
            [id] => Ok(Command::Show { id: parse_id(id)?, offline: false }),
            [id, flag] if flag == "--offline" => Ok(Command::Show { id: parse_id(id)?, offline: true }),
            _ => bail!("show expects <id> [--offline]"),
        },
        "upload" => parse_upload(rest),
        "set-category" => match rest {
            [id, category] => Ok(Command::SetCategory {
                id: parse_id(id)?,
                category: parse_category(category)?,
            }),
            _ => bail!("set-category expects <id> <category>"),
        },
        "delete" | "rm" => match rest {
            [id] => Ok(Command::Delete { id: parse_id(id)? }),
            _ => bail!("delete expects <id>"),
        },
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => bail!("Unknown command '{}'", other),
    }
}

fn expect_at_most(command: &str, rest: &[String], max: usize) -> Result<()> {
    if rest.len() > max {
        bail!("Unexpected argument '{}' for {}", rest[max], command);
    }
    Ok(())
}

fn parse_id(value: &str) -> Result<i64> {
    value
        .parse()
        .with_context(|| format!("Invalid document id '{}'", value))
}

fn option_value<'a>(flag: &str, iter: &mut std::slice::Iter<'a, String>) -> Result<&'a String> {
    iter.next().ok_or_else(|| anyhow!("{} needs a value", flag))
}

fn parse_category(value: &str) -> Result<Category> {
    value.parse().map_err(|e: String| anyhow!(e))
}

fn parse_list(rest: &[String]) -> Result<Command> {
    let mut filter = DocumentFilter::default();
    let mut offline = false;
    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--category" | "-c" => filter.category = Some(parse_category(option_value(arg, &mut iter)?)?),
            "--search" | "-s" => filter.query = Some(option_value(arg, &mut iter)?.clone()),
            "--sort" => {
                filter.sort = option_value(arg, &mut iter)?
                    .parse()
                    .map_err(|e: String| anyhow!(e))?
            }
            "--offline" => offline = true,
            other => bail!("Unknown option '{}' for list", other),
        }
    }
    Ok(Command::List { filter, offline })
}

fn parse_upload(rest: &[String]) -> Result<Command> {
    let mut path = None;
    let mut category = None;
    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--category" | "-c" => category = Some(parse_category(option_value(arg, &mut iter)?)?),
            flag if flag.starts_with('-') => bail!("Unknown option '{}' for upload", flag),
            file if path.is_none() => path = Some(PathBuf::from(file)),
            extra => bail!("Unexpected argument '{}' for upload", extra),
        }
    }
    let path = path.ok_or_else(|| anyhow!("upload expects <file>"))?;
    Ok(Command::Upload { path, category })
}
