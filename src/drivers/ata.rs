//! ATA PIO, LBA28, master drive only, one 512-byte sector per call.
//!
//! No IRQ14, no DMA, no slave/secondary-channel support — the FAT12 adapter
//! never needs more than this. Busy-wait polling throughout; acceptable
//! because every caller already runs with interrupts enabled and nothing
//! else contends for the disk.
//!
//! https://wiki.osdev.org/ATA_PIO_Mode

use crate::io_port::IoPort;

const DATA: u16 = 0x1F0;
const ERROR_FEATURES: u16 = 0x1F1;
const SECTOR_COUNT: u16 = 0x1F2;
const LBA_LOW: u16 = 0x1F3;
const LBA_MID: u16 = 0x1F4;
const LBA_HIGH: u16 = 0x1F5;
const DRIVE_HEAD: u16 = 0x1F6;
const COMMAND_STATUS: u16 = 0x1F7;

const STATUS_ERR: u8 = 1 << 0;
const STATUS_DRQ: u8 = 1 << 3;
const STATUS_BSY: u8 = 1 << 7;

const CMD_READ_SECTORS: u8 = 0x20;
const CMD_WRITE_SECTORS: u8 = 0x30;
const CMD_CACHE_FLUSH: u8 = 0xE7;

/// Master drive, LBA mode (bits 5 and 6 of the drive/head byte are always 1
/// on real hardware; bit 4 selects master/slave, here always master).
const DRIVE_HEAD_LBA_MASTER: u8 = 0xE0;

pub const SECTOR_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtaError {
    /// The device set ERR in the status register.
    DeviceFault,
}

fn wait_while_busy() {
    while IoPort::read_u8(COMMAND_STATUS) & STATUS_BSY != 0 {}
}

fn wait_for_data() -> Result<(), AtaError> {
    loop {
        let status = IoPort::read_u8(COMMAND_STATUS);
        if status & STATUS_ERR != 0 {
            return Err(AtaError::DeviceFault);
        }
        if status & STATUS_BSY == 0 && status & STATUS_DRQ != 0 {
            return Ok(());
        }
    }
}

fn select(lba: u32) {
    IoPort::write_u8(DRIVE_HEAD, DRIVE_HEAD_LBA_MASTER | ((lba >> 24) & 0x0F) as u8);
    IoPort::write_u8(ERROR_FEATURES, 0);
    IoPort::write_u8(SECTOR_COUNT, 1);
    IoPort::write_u8(LBA_LOW, lba as u8);
    IoPort::write_u8(LBA_MID, (lba >> 8) as u8);
    IoPort::write_u8(LBA_HIGH, (lba >> 16) as u8);
}

/// Reads LBA `lba` into `buf`.
pub fn read_sector(lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), AtaError> {
    wait_while_busy();
    select(lba);
    IoPort::write_u8(COMMAND_STATUS, CMD_READ_SECTORS);
    wait_for_data()?;

    for word_pair in buf.chunks_exact_mut(2) {
        let word = IoPort::read_u16(DATA);
        word_pair[0] = word as u8;
        word_pair[1] = (word >> 8) as u8;
    }
    Ok(())
}

/// Writes `buf` to LBA `lba`, flushing the write cache before returning.
pub fn write_sector(lba: u32, buf: &[u8; SECTOR_SIZE]) -> Result<(), AtaError> {
    wait_while_busy();
    select(lba);
    IoPort::write_u8(COMMAND_STATUS, CMD_WRITE_SECTORS);
    wait_for_data()?;

    for word_pair in buf.chunks_exact(2) {
        let word = word_pair[0] as u16 | ((word_pair[1] as u16) << 8);
        IoPort::write_u16(DATA, word);
    }

    IoPort::write_u8(COMMAND_STATUS, CMD_CACHE_FLUSH);
    wait_while_busy();
    Ok(())
}
