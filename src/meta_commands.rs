pub enum MetaCommand {
    Exit,
    Help,
}

#[derive(Debug)]
pub enum MetaCommandError {
    UnrecognizedCommand,
}

pub const HELP: &str = "\
space                      create an address space
spawn SPACE OP...          start a thread; OP is r:ADDR w:ADDR=BYTE l:PAGE u:PAGE
kill THREAD                kill a thread
destroy SPACE              kill a space's threads and free its memory
step [N]                   run N scheduling steps
run                        run until idle
frames | pages SPACE       show the frame table or a page table
threads | stats | events   show threads, counters or new events
.help | .exit";

pub fn handle_meta_command(input: &str) -> Result<MetaCommand, MetaCommandError> {
    match input {
        ".exit" => Ok(MetaCommand::Exit),
        ".help" => Ok(MetaCommand::Help),
        _ => Err(MetaCommandError::UnrecognizedCommand),
    }
}
