use cursive::{
    view::{Nameable, Resizable},
    views::{Button, Dialog, DummyView, LinearLayout, TextView},
    Cursive,
};
use cursive_table_view::{TableView, TableViewItem};
use log::error;
use paging_core::{
    mmu::Mmu,
    sim::{Op, Simulator},
    swap::MemorySwap,
    MmuConfig, SpaceId,
};

const VIRTUAL_ADDRESS_BITS: u32 = 12;
const PAGE_ADDRESS_BITS: u32 = 4;
const FRAME_COUNT: usize = 4;
const PAGE: u32 = 1 << (VIRTUAL_ADDRESS_BITS - PAGE_ADDRESS_BITS);

type Sim = Simulator<MemorySwap>;

#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
enum FrameColumn {
    Frame,
    Page,
    Flags,
    Pins,
    Reserved,
}

#[derive(Debug, Clone)]
struct FrameRow {
    frame: usize,
    page: String,
    flags: String,
    pins: u32,
    reserved: String,
}

impl TableViewItem<FrameColumn> for FrameRow {
    fn to_column(&self, column: FrameColumn) -> String {
        match column {
            FrameColumn::Frame => format!("f{}", self.frame),
            FrameColumn::Page => self.page.clone(),
            FrameColumn::Flags => self.flags.clone(),
            FrameColumn::Pins => self.pins.to_string(),
            FrameColumn::Reserved => self.reserved.clone(),
        }
    }

    fn cmp(&self, other: &Self, column: FrameColumn) -> std::cmp::Ordering
    where
        Self: Sized,
    {
        match column {
            FrameColumn::Pins => self.pins.cmp(&other.pins),
            _ => self.frame.cmp(&other.frame),
        }
    }
}

fn rows(mmu: &Mmu) -> Vec<FrameRow> {
    mmu.frames()
        .iter()
        .map(|(id, frame)| FrameRow {
            frame: id.0,
            page: frame
                .mapped_page()
                .map(|p| p.to_string())
                .unwrap_or_default(),
            flags: format!(
                "{}{}",
                if frame.is_referenced() { 'R' } else { '-' },
                if frame.is_dirty() { 'D' } else { '-' }
            ),
            pins: frame.lock_count(),
            reserved: frame
                .reserved_by()
                .map(|s| s.to_string())
                .unwrap_or_default(),
        })
        .collect()
}

fn make_table(mmu: &Mmu) -> TableView<FrameRow, FrameColumn> {
    let mut table = TableView::<FrameRow, FrameColumn>::new();
    let columns = [
        (FrameColumn::Frame, "frame"),
        (FrameColumn::Page, "page"),
        (FrameColumn::Flags, "flags"),
        (FrameColumn::Pins, "pins"),
        (FrameColumn::Reserved, "reserved"),
    ];
    for (i, (column, title)) in columns.into_iter().enumerate() {
        table.insert_column(i, column, title, |c| c);
    }
    table.set_items(rows(mmu));
    table
}

fn status(sim: &Sim) -> String {
    let stats = sim.mmu().stats();
    format!(
        "clock {}  faults {}  evictions {}  write-backs {}  out of frames {}  pending I/O {}",
        sim.clock(),
        stats.faults,
        stats.evictions,
        stats.write_backs,
        stats.out_of_frames,
        sim.pending_io()
    )
}

/// Two address spaces competing for the frames.
fn demo() -> Option<Sim> {
    let config = MmuConfig::new(VIRTUAL_ADDRESS_BITS, PAGE_ADDRESS_BITS, FRAME_COUNT);
    let mut sim = match Simulator::new(config, MemorySwap::new()) {
        Ok(sim) => sim,
        Err(e) => {
            error!("{}", e);
            return None;
        }
    };
    let spaces: Vec<SpaceId> = (0..2).filter_map(|_| sim.create_space().ok()).collect();
    for (i, space) in spaces.into_iter().enumerate() {
        let base = i as u32;
        let programs = [
            vec![
                Op::Write(base, 1),
                Op::Write(PAGE + base, 2),
                Op::Read(2 * PAGE),
                Op::Read(base),
            ],
            vec![
                Op::Lock(3),
                Op::Write(3 * PAGE, 9),
                Op::Read(4 * PAGE),
                Op::Unlock(3),
                Op::Read(PAGE + base),
            ],
        ];
        for ops in programs {
            if let Err(e) = sim.spawn(space, ops) {
                error!("{}", e);
            }
        }
    }
    Some(sim)
}

fn step(s: &mut Cursive, steps: usize) {
    let update = s.with_user_data(|sim: &mut Sim| {
        for _ in 0..steps {
            if !sim.step() {
                break;
            }
        }
        let events = sim
            .take_events()
            .iter()
            .map(|e| format!("{:?}", e))
            .collect::<Vec<_>>()
            .join("\n");
        (rows(sim.mmu()), status(sim), events)
    });
    let Some((items, line, events)) = update else {
        return;
    };
    s.call_on_name("frames", |table: &mut TableView<FrameRow, FrameColumn>| {
        table.set_items(items);
    });
    s.call_on_name("status", |view: &mut TextView| view.set_content(line));
    if !events.is_empty() {
        s.call_on_name("events", |view: &mut TextView| view.set_content(events));
    }
}

fn main() {
    let Some(sim) = demo() else {
        return;
    };

    let mut siv = cursive::default();
    siv.add_global_callback('q', |s| s.quit());

    let table = make_table(sim.mmu())
        .with_name("frames")
        .min_size((50, FRAME_COUNT + 2));
    let buttons = LinearLayout::vertical()
        .child(Button::new("Step", |s| step(s, 1)))
        .child(Button::new("Step 10", |s| step(s, 10)))
        .child(DummyView)
        .child(Button::new("Quit", |s| s.quit()));
    let body = LinearLayout::vertical()
        .child(LinearLayout::horizontal().child(table).child(buttons))
        .child(TextView::new(status(&sim)).with_name("status"))
        .child(DummyView)
        .child(TextView::new("").with_name("events").min_height(8));

    siv.set_user_data(sim);
    siv.add_layer(Dialog::around(body).title("Frames"));
    siv.run();
}
