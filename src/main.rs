use std::io::{self, Write};

use paging_core::{
    meta_commands::{handle_meta_command, MetaCommand, MetaCommandError, HELP},
    repl::{format_frames, format_pages, parse_command, Command, REPL},
    sim::Simulator,
    swap::{BackingStore, MemorySwap, SwapFile},
    MmuConfig,
};

const VIRTUAL_ADDRESS_BITS: u32 = 16;
const PAGE_ADDRESS_BITS: u32 = 6;
const FRAME_COUNT: usize = 8;
const MAX_SPACES: usize = 8;
const SWAP_FILE: &str = "main";

fn execute<S: BackingStore>(sim: &mut Simulator<S>, command: Command) {
    match command {
        Command::Space => match sim.create_space() {
            Ok(space) => println!("{}", space),
            Err(e) => println!("Error: {}", e),
        },
        Command::Spawn(space, ops) => match sim.spawn(space, ops) {
            Ok(thread) => println!("{}", thread),
            Err(e) => println!("Error: {}", e),
        },
        Command::Kill(thread) => {
            if let Err(e) = sim.kill(thread) {
                println!("Error: {}", e);
            }
        }
        Command::Destroy(space) => {
            if let Err(e) = sim.destroy_space(space) {
                println!("Error: {}", e);
            }
        }
        Command::Step(n) => {
            let taken = (0..n).take_while(|_| sim.step()).count();
            println!("{} steps, clock {}", taken, sim.clock());
            print_events(sim);
        }
        Command::Run => {
            let taken = sim.run();
            println!("{} steps, clock {}", taken, sim.clock());
            print_events(sim);
        }
        Command::Frames => print!("{}", format_frames(sim.mmu())),
        Command::Pages(space) => match format_pages(sim.mmu(), space) {
            Some(pages) => print!("{}", pages),
            None => println!("Error: unknown address space {}", space),
        },
        Command::Threads => {
            for (thread, space, state) in sim.threads() {
                println!("{} in {}: {:?} ({:?})", thread, space, state, sim.thread_status(thread));
            }
        }
        Command::Stats => {
            println!("{:#?}", sim.mmu().stats());
            println!("pending I/O: {}", sim.pending_io());
        }
        Command::Events => print_events(sim),
    }
    if let Err(violation) = sim.check_invariants() {
        println!("Invariant broken: {}", violation);
    }
}

fn print_events<S: BackingStore>(sim: &mut Simulator<S>) {
    for event in sim.take_events() {
        println!("  {:?}", event);
    }
}

fn repl<S: BackingStore>(mut sim: Simulator<S>) {
    let repl = REPL {};
    loop {
        print!("vm > ");
        let _ = io::stdout().flush();
        let input = match repl.read_line() {
            Ok(input) => input,
            Err(e) => {
                println!("Error: {}", e);
                return;
            }
        };
        if input.starts_with('.') {
            match handle_meta_command(&input) {
                Ok(MetaCommand::Exit) => return,
                Ok(MetaCommand::Help) => println!("{}", HELP),
                Err(MetaCommandError::UnrecognizedCommand) => {
                    println!("Unrecognized command '{}'", input)
                }
            }
            continue;
        }
        if input.is_empty() {
            continue;
        }
        match parse_command(&input) {
            Ok(command) => execute(&mut sim, command),
            Err(e) => println!("Error: {}", e),
        }
    }
}

fn main() {
    env_logger::init();

    let config = MmuConfig::new(VIRTUAL_ADDRESS_BITS, PAGE_ADDRESS_BITS, FRAME_COUNT);
    let in_memory = std::env::args().any(|arg| arg == "--memory");
    println!("---- {} frames of {} bytes ----", config.frame_count, config.page_size());

    let started = if in_memory {
        Simulator::new(config, MemorySwap::new()).map(repl)
    } else {
        let swap = SwapFile::create(
            SWAP_FILE,
            config.page_size(),
            config.pages_per_space(),
            MAX_SPACES,
        );
        match swap {
            Ok(swap) => Simulator::new(config, swap).map(repl),
            Err(e) => {
                println!("Error: {}", e);
                return;
            }
        }
    };
    if let Err(e) = started {
        println!("Error: {}", e);
    }
}
