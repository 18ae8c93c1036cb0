//! Useful library code for tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use sdspi_disk::sdcard::proto::{DATA_RES_ACCEPTED, DATA_RES_MASK, DATA_START_TOKEN};
use sdspi_disk::{Block, BusSpeed, BusTransport, BLOCK_LEN, FILL_BYTE};

/// What the simulated card is doing between bus transfers.
#[derive(Debug, Copy, Clone)]
enum Phase {
    /// Watching the incoming bytes for the start of a command frame.
    AwaitCommand,
    /// Collecting the rest of a six byte command frame.
    CollectCommand,
    /// A read command was accepted; this many filler bytes still go out
    /// before the start-of-data token.
    ReadDelay { remaining: u32 },
    /// A write command was accepted; waiting for the start-of-data token.
    AwaitWriteToken,
    /// Collecting the 512 byte write payload.
    CollectWriteData,
    /// Collecting the two checksum bytes that close a write.
    CollectWriteCrc { have: usize },
    /// Holding the data line low after a write. `None` means for ever.
    Busy { remaining: Option<u32> },
}

/// A scripted SD card on the other end of the bus.
///
/// Behaves like a well mannered SPI-mode card: it hunts for command
/// frames in the byte stream, answers them after a short response delay,
/// and runs the data packet protocol for single block reads and writes.
/// The public fields script how co-operative it is; the counters record
/// what the driver actually did to it.
///
/// The defaults describe a fresh, healthy card that boots on the first
/// attempt of every stage.
pub struct SimCard {
    /// Answer the reset command with idle status from this attempt on.
    /// `None` simulates a card that never wakes up.
    pub idle_after: Option<u32>,
    /// Report ready from this op-cond attempt on. `None` simulates a
    /// card that never leaves idle.
    pub ready_after: Option<u32>,
    /// Status byte answering the interface condition command.
    pub if_cond_status: u8,
    /// The four byte voltage window and check pattern echo.
    pub if_cond_trailer: [u8; 4],
    /// The four byte operating conditions register.
    pub ocr_trailer: [u8; 4],
    /// Status byte answering single block read commands.
    pub read_status: u8,
    /// Reject reads at or above this block address, as if out of range.
    pub reject_reads_from: Option<u32>,
    /// Status byte answering single block write commands.
    pub write_status: u8,
    /// Filler bytes sent before the start-of-data token on reads.
    pub data_token_delay: u32,
    /// The data response token for writes. The default keeps its upper
    /// bits set, so a driver must mask before comparing.
    pub data_response: u8,
    /// Busy bytes held after an accepted write. `None` means stuck busy.
    pub busy_bytes: Option<u32>,
    /// Filler bytes sent before each command response.
    pub response_delay: u32,

    /// Every command frame received, as (opcode, argument).
    pub command_log: Vec<(u8, u32)>,
    /// Every clock rate the host asked for, in order.
    pub speed_log: Vec<BusSpeed>,
    /// Total byte transfers, selected or not.
    pub traffic: usize,
    /// Filler bytes clocked out before the first select.
    pub wake_fills: usize,
    /// Chip-select line edges.
    pub cs_transitions: usize,
    /// Response bytes the host abandoned by deselecting early.
    pub undrained_bytes: usize,

    selected: bool,
    select_count: usize,
    phase: Phase,
    outgoing: VecDeque<u8>,
    frame: [u8; 6],
    frame_have: usize,
    incoming: Vec<u8>,
    pending_block: u32,
    acmd_armed: bool,
    resets_seen: u32,
    op_conds_seen: u32,
    blocks: HashMap<u32, Block>,
}

impl SimCard {
    pub fn new() -> SimCard {
        SimCard {
            idle_after: Some(1),
            ready_after: Some(1),
            if_cond_status: 0x01,
            if_cond_trailer: [0x00, 0x00, 0x01, 0xAA],
            ocr_trailer: [0x40, 0xFF, 0x80, 0x00],
            read_status: 0x00,
            reject_reads_from: None,
            write_status: 0x00,
            data_token_delay: 0,
            data_response: 0xE5,
            busy_bytes: Some(2),
            response_delay: 1,
            command_log: Vec::new(),
            speed_log: Vec::new(),
            traffic: 0,
            wake_fills: 0,
            cs_transitions: 0,
            undrained_bytes: 0,
            selected: false,
            select_count: 0,
            phase: Phase::AwaitCommand,
            outgoing: VecDeque::new(),
            frame: [0u8; 6],
            frame_have: 0,
            incoming: Vec::new(),
            pending_block: 0,
            acmd_armed: false,
            resets_seen: 0,
            op_conds_seen: 0,
            blocks: HashMap::new(),
        }
    }

    /// Is the chip-select line high right now?
    pub fn is_deselected(&self) -> bool {
        !self.selected
    }

    /// How many commands with this opcode arrived.
    pub fn command_count(&self, opcode: u8) -> usize {
        self.command_log.iter().filter(|(op, _)| *op == opcode).count()
    }

    /// The opcodes received, in arrival order.
    pub fn opcodes(&self) -> Vec<u8> {
        self.command_log.iter().map(|(op, _)| *op).collect()
    }

    /// Put contents into the card's storage behind the driver's back.
    pub fn preload_block(&mut self, idx: u32, contents: Block) {
        self.blocks.insert(idx, contents);
    }

    /// What the card's storage holds for this block, if anything.
    pub fn stored_block(&self, idx: u32) -> Option<&Block> {
        self.blocks.get(&idx)
    }

    /// The next byte the card puts on the bus.
    fn produce(&mut self) -> u8 {
        if let Some(byte) = self.outgoing.pop_front() {
            return byte;
        }
        match self.phase {
            Phase::ReadDelay { remaining: 0 } => {
                let contents = self
                    .blocks
                    .get(&self.pending_block)
                    .copied()
                    .unwrap_or([0u8; BLOCK_LEN]);
                self.outgoing.push_back(DATA_START_TOKEN);
                self.outgoing.extend(contents);
                // Two checksum bytes close the packet. Nobody checks them.
                self.outgoing.push_back(0xAA);
                self.outgoing.push_back(0x55);
                self.phase = Phase::AwaitCommand;
                self.outgoing.pop_front().unwrap_or(FILL_BYTE)
            }
            Phase::ReadDelay { remaining } => {
                self.phase = Phase::ReadDelay {
                    remaining: remaining - 1,
                };
                FILL_BYTE
            }
            Phase::Busy { remaining: None } => 0x00,
            Phase::Busy { remaining: Some(0) } => {
                self.phase = Phase::AwaitCommand;
                FILL_BYTE
            }
            Phase::Busy {
                remaining: Some(left),
            } => {
                self.phase = Phase::Busy {
                    remaining: Some(left - 1),
                };
                0x00
            }
            _ => FILL_BYTE,
        }
    }

    /// React to the byte the host just put on the bus.
    fn feed(&mut self, mosi: u8) {
        match self.phase {
            Phase::AwaitCommand => {
                // Frame bits 0b01 mark the first byte of a command.
                if mosi & 0xC0 == 0x40 {
                    self.frame[0] = mosi;
                    self.frame_have = 1;
                    self.phase = Phase::CollectCommand;
                }
            }
            Phase::CollectCommand => {
                self.frame[self.frame_have] = mosi;
                self.frame_have += 1;
                if self.frame_have == self.frame.len() {
                    self.execute_command();
                }
            }
            Phase::AwaitWriteToken => {
                if mosi == DATA_START_TOKEN {
                    self.incoming.clear();
                    self.phase = Phase::CollectWriteData;
                }
            }
            Phase::CollectWriteData => {
                self.incoming.push(mosi);
                if self.incoming.len() == BLOCK_LEN {
                    self.phase = Phase::CollectWriteCrc { have: 0 };
                }
            }
            Phase::CollectWriteCrc { have } => {
                if have + 1 < 2 {
                    self.phase = Phase::CollectWriteCrc { have: have + 1 };
                } else {
                    self.finish_write();
                }
            }
            Phase::ReadDelay { .. } | Phase::Busy { .. } => {}
        }
    }

    fn execute_command(&mut self) {
        let opcode = self.frame[0] & 0x3F;
        let argument =
            u32::from_be_bytes([self.frame[1], self.frame[2], self.frame[3], self.frame[4]]);
        self.command_log.push((opcode, argument));
        let application = std::mem::take(&mut self.acmd_armed);
        self.phase = Phase::AwaitCommand;
        // A real card needs a few clocks before its response appears.
        for _ in 0..self.response_delay {
            self.outgoing.push_back(FILL_BYTE);
        }
        match opcode {
            0 => {
                self.resets_seen += 1;
                // A card that has not woken up yet leaves the line high.
                if self.idle_after.is_some_and(|n| self.resets_seen >= n) {
                    self.outgoing.push_back(0x01);
                }
            }
            8 => {
                self.outgoing.push_back(self.if_cond_status);
                if self.if_cond_status == 0x01 {
                    self.outgoing.extend(self.if_cond_trailer);
                }
            }
            55 => {
                self.outgoing.push_back(self.current_status());
                self.acmd_armed = true;
            }
            41 if application => {
                self.op_conds_seen += 1;
                self.outgoing.push_back(self.current_status());
            }
            58 => {
                self.outgoing.push_back(self.current_status());
                self.outgoing.extend(self.ocr_trailer);
            }
            17 => {
                let status = if self.reject_reads_from.is_some_and(|from| argument >= from) {
                    0x04
                } else {
                    self.read_status
                };
                self.outgoing.push_back(status);
                if status == 0x00 {
                    self.pending_block = argument;
                    self.phase = Phase::ReadDelay {
                        remaining: self.data_token_delay,
                    };
                }
            }
            24 => {
                self.outgoing.push_back(self.write_status);
                if self.write_status == 0x00 {
                    self.pending_block = argument;
                    self.phase = Phase::AwaitWriteToken;
                }
            }
            _ => {
                self.outgoing.push_back(0x05);
            }
        }
    }

    /// Idle until the op-cond threshold is reached, ready afterwards.
    fn current_status(&self) -> u8 {
        let ready = self.ready_after.is_some_and(|n| self.op_conds_seen >= n);
        if ready {
            0x00
        } else {
            0x01
        }
    }

    fn finish_write(&mut self) {
        let accepted = (self.data_response & DATA_RES_MASK) == DATA_RES_ACCEPTED;
        if accepted {
            let mut contents = [0u8; BLOCK_LEN];
            contents.copy_from_slice(&self.incoming);
            self.blocks.insert(self.pending_block, contents);
        }
        self.outgoing.push_back(self.data_response);
        self.phase = if accepted {
            Phase::Busy {
                remaining: self.busy_bytes,
            }
        } else {
            Phase::AwaitCommand
        };
    }
}

impl Default for SimCard {
    fn default() -> SimCard {
        SimCard::new()
    }
}

impl BusTransport for SimCard {
    fn transfer_byte(&mut self, out: u8) -> u8 {
        self.traffic += 1;
        if !self.selected {
            if self.select_count == 0 && out == FILL_BYTE {
                self.wake_fills += 1;
            }
            return FILL_BYTE;
        }
        // Decide the outgoing byte from the state before this transfer;
        // both directions move during the same eight clocks.
        let miso = self.produce();
        self.feed(out);
        miso
    }

    fn select(&mut self) {
        self.select_count += 1;
        if !self.selected {
            self.selected = true;
            self.cs_transitions += 1;
        }
    }

    fn deselect(&mut self) {
        if self.selected {
            self.selected = false;
            self.cs_transitions += 1;
            self.undrained_bytes += self.outgoing.iter().filter(|&&b| b != FILL_BYTE).count();
            self.outgoing.clear();
            self.phase = Phase::AwaitCommand;
        }
    }

    fn set_speed(&mut self, speed: BusSpeed) {
        self.speed_log.push(speed);
    }
}

/// A payload that cycles through every byte value, so tokens and filler
/// bytes also appear inside the data.
pub fn pattern_block(seed: u8) -> Block {
    let mut block = [0u8; BLOCK_LEN];
    for (i, byte) in block.iter_mut().enumerate() {
        *byte = (i as u8).wrapping_mul(7).wrapping_add(seed);
    }
    block
}

/// A delay provider that does not delay.
pub struct NoopDelay;

impl embedded_hal::delay::DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// A delay provider that records every pause instead of sleeping.
///
/// Clones share the record, so keep one and hand the other to the driver.
#[derive(Clone, Default)]
pub struct RecordingDelay {
    pauses: Rc<RefCell<Vec<u32>>>,
}

impl RecordingDelay {
    pub fn new() -> RecordingDelay {
        RecordingDelay::default()
    }

    /// Every pause asked for so far, in microseconds.
    pub fn pauses_us(&self) -> Vec<u32> {
        self.pauses.borrow().clone()
    }
}

impl embedded_hal::delay::DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.pauses.borrow_mut().push(ns / 1000);
    }

    fn delay_us(&mut self, us: u32) {
        self.pauses.borrow_mut().push(us);
    }
}

/// Send driver logs to the test output. Run with `RUST_LOG=trace` to see
/// the whole card conversation.
pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
