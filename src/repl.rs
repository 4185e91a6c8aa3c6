use std::{fmt::Write, io};

use crate::{mmu::Mmu, sim::Op, SpaceId, ThreadId};

pub struct REPL {}

impl REPL {
    pub fn read_line(&self) -> Result<String, io::Error> {
        let mut buffer = String::new();
        let stdin = std::io::stdin();
        stdin.read_line(&mut buffer)?;
        let buffer = buffer.trim().to_string();
        Ok(buffer)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Space,
    Spawn(SpaceId, Vec<Op>),
    Kill(ThreadId),
    Destroy(SpaceId),
    Step(usize),
    Run,
    Frames,
    Pages(SpaceId),
    Threads,
    Stats,
    Events,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    UnrecognizedCommand(String),
    MissingArgument(&'static str),
    BadNumber(String),
    BadOp(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty command"),
            ParseError::UnrecognizedCommand(c) => write!(f, "unrecognized command '{}'", c),
            ParseError::MissingArgument(a) => write!(f, "missing argument: {}", a),
            ParseError::BadNumber(n) => write!(f, "not a number: '{}'", n),
            ParseError::BadOp(o) => write!(
                f,
                "bad operation '{}', expected r:ADDR w:ADDR=BYTE l:PAGE u:PAGE",
                o
            ),
        }
    }
}

fn number(s: &str) -> Result<u64, ParseError> {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| ParseError::BadNumber(s.to_string()))
}

fn narrow<T: TryFrom<u64>>(s: &str) -> Result<T, ParseError> {
    T::try_from(number(s)?).map_err(|_| ParseError::BadNumber(s.to_string()))
}

/// `r:ADDR`, `w:ADDR=BYTE`, `l:PAGE` or `u:PAGE`.
pub fn parse_op(s: &str) -> Result<Op, ParseError> {
    let bad = || ParseError::BadOp(s.to_string());
    let (kind, arg) = s.split_once(':').ok_or_else(bad)?;
    match kind {
        "r" => Ok(Op::Read(narrow(arg)?)),
        "w" => {
            let (address, value) = arg.split_once('=').ok_or_else(bad)?;
            Ok(Op::Write(narrow(address)?, narrow(value)?))
        }
        "l" => Ok(Op::Lock(narrow(arg)?)),
        "u" => Ok(Op::Unlock(narrow(arg)?)),
        _ => Err(bad()),
    }
}

pub fn parse_command(input: &str) -> Result<Command, ParseError> {
    let mut words = input.split_whitespace();
    let command = words.next().ok_or(ParseError::Empty)?;
    match command {
        "space" => Ok(Command::Space),
        "spawn" => {
            let space = words.next().ok_or(ParseError::MissingArgument("space"))?;
            let ops = words.map(parse_op).collect::<Result<Vec<_>, _>>()?;
            Ok(Command::Spawn(SpaceId(narrow(space)?), ops))
        }
        "kill" => {
            let thread = words.next().ok_or(ParseError::MissingArgument("thread"))?;
            Ok(Command::Kill(ThreadId(narrow(thread)?)))
        }
        "destroy" => {
            let space = words.next().ok_or(ParseError::MissingArgument("space"))?;
            Ok(Command::Destroy(SpaceId(narrow(space)?)))
        }
        "step" => match words.next() {
            Some(n) => Ok(Command::Step(narrow(n)?)),
            None => Ok(Command::Step(1)),
        },
        "run" => Ok(Command::Run),
        "frames" => Ok(Command::Frames),
        "pages" => {
            let space = words.next().ok_or(ParseError::MissingArgument("space"))?;
            Ok(Command::Pages(SpaceId(narrow(space)?)))
        }
        "threads" => Ok(Command::Threads),
        "stats" => Ok(Command::Stats),
        "events" => Ok(Command::Events),
        other => Err(ParseError::UnrecognizedCommand(other.to_string())),
    }
}

fn flag(set: bool, c: char) -> char {
    if set {
        c
    } else {
        '-'
    }
}

pub fn format_frames(mmu: &Mmu) -> String {
    let mut out = String::from("frame  page      flags  pins  reserved\n");
    for (id, frame) in mmu.frames().iter() {
        let page = frame
            .mapped_page()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let reserved = frame
            .reserved_by()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<6} {:<9} {}{}     {:<5} {}",
            id.to_string(),
            page,
            flag(frame.is_referenced(), 'R'),
            flag(frame.is_dirty(), 'D'),
            frame.lock_count(),
            reserved
        );
    }
    out
}

/// Resident and faulting pages of a space.
pub fn format_pages(mmu: &Mmu, space: SpaceId) -> Option<String> {
    let table = mmu.page_table(space)?;
    let mut out = String::from("page  frame  state\n");
    for (page, entry) in table.iter() {
        if !entry.is_valid() && entry.frame().is_none() && !entry.is_faulting() {
            continue;
        }
        let frame = entry
            .frame()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "-".to_string());
        let state = match entry.validating_thread() {
            Some(thread) => format!("faulting ({})", thread),
            None if entry.is_valid() => "valid".to_string(),
            None => "invalid".to_string(),
        };
        let _ = writeln!(out, "{:<5} {:<6} {}", page.number, frame, state);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MmuConfig;

    #[test]
    fn parse_ops() {
        assert_eq!(parse_op("r:0x400"), Ok(Op::Read(0x400)));
        assert_eq!(parse_op("w:12=255"), Ok(Op::Write(12, 255)));
        assert_eq!(parse_op("l:3"), Ok(Op::Lock(3)));
        assert_eq!(parse_op("u:3"), Ok(Op::Unlock(3)));
        assert_eq!(
            parse_op("w:12=256"),
            Err(ParseError::BadNumber("256".to_string()))
        );
        assert_eq!(parse_op("x:1"), Err(ParseError::BadOp("x:1".to_string())));
    }

    #[test]
    fn parse_commands() {
        assert_eq!(
            parse_command("spawn 1 r:0 w:0x10=7"),
            Ok(Command::Spawn(
                SpaceId(1),
                vec![Op::Read(0), Op::Write(0x10, 7)]
            ))
        );
        assert_eq!(parse_command("step"), Ok(Command::Step(1)));
        assert_eq!(parse_command("step 20"), Ok(Command::Step(20)));
        assert_eq!(parse_command("kill 4"), Ok(Command::Kill(ThreadId(4))));
        assert_eq!(parse_command("   "), Err(ParseError::Empty));
        assert_eq!(
            parse_command("destroy"),
            Err(ParseError::MissingArgument("space"))
        );
        assert_eq!(
            parse_command("select *"),
            Err(ParseError::UnrecognizedCommand("select".to_string()))
        );
    }

    #[test]
    fn frames_listing() {
        let mmu = Mmu::new(MmuConfig::new(12, 4, 2)).unwrap();
        let listing = format_frames(&mmu);
        assert_eq!(listing.lines().count(), 3);
        assert!(listing.lines().nth(1).unwrap().starts_with("f0"));
        assert!(format_pages(&mmu, SpaceId(0)).is_none());
    }
}
