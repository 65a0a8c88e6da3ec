use anyhow::{Context, Result};
use common::types::SigningState;
use std::{env, fs, path::Path};

const USAGE: &str = "Usage:
  signerctl show  <state-file>
  signerctl set   <state-file> <epoch>
  signerctl reset <state-file>";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Show(String),
    Set(String, i64),
    Reset(String),
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args {
        [cmd, path] if cmd == "show" => Ok(Command::Show(path.clone())),
        [cmd, path] if cmd == "reset" => Ok(Command::Reset(path.clone())),
        [cmd, path, epoch] if cmd == "set" => {
            let epoch: i64 = epoch
                .parse()
                .with_context(|| format!("'{}' is not an epoch number", epoch))?;
            if epoch < SigningState::NONE_COMPLETED {
                anyhow::bail!("epoch must be {} or greater", SigningState::NONE_COMPLETED);
            }
            Ok(Command::Set(path.clone(), epoch))
        }
        _ => anyhow::bail!("{}", USAGE),
    }
}

fn read_state(path: &Path) -> Result<Option<SigningState>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let state = SigningState::from_json(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(state))
}

fn write_state(path: &Path, state: &SigningState) -> Result<()> {
    let body = state.to_pretty_json().context("serializing state")?;
    // write-then-rename, same as the signer's JsonFileStore
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("replacing {}", path.display()));
    }
    Ok(())
}

fn run(cmd: Command) -> Result<()> {
    match cmd {
        Command::Show(path) => match read_state(Path::new(&path))? {
            Some(state) => println!("last completed epoch: {}", state.last_completed_epoch),
            None => println!("no checkpoint at {} (signer starts from scratch)", path),
        },
        Command::Set(path, epoch) => {
            let path = Path::new(&path);
            if let Some(prev) = read_state(path).ok().flatten() {
                if epoch < prev.last_completed_epoch {
                    eprintln!(
                        "Warning: moving checkpoint back from {} to {}, those epochs will be re-checked",
                        prev.last_completed_epoch, epoch
                    );
                }
            }
            write_state(path, &SigningState::new(epoch))?;
            println!("checkpoint set to {}", epoch);
        }
        Command::Reset(path) => {
            write_state(Path::new(&path), &SigningState::default())?;
            println!("checkpoint reset");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cmd = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    };
    run(cmd)
}
