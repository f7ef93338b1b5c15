//! Fixed VGA text-mode console (SPEC_FULL §4.8) — no VBE framebuffer or PSF
//! font rendering in this kernel. Structurally mirrors `serial.rs`: a
//! `Write` impl over a `Mutex`-guarded global built with `LazyCell`.

use core::cell::LazyCell;
use core::fmt;
use spin::Mutex;

use crate::config::VGA_BUFFER_ADDR;
use crate::io_port::IoPort;

const BUFFER_WIDTH: usize = 80;
const BUFFER_HEIGHT: usize = 25;

const CURSOR_PORT_INDEX: u16 = 0x3D4;
const CURSOR_PORT_DATA: u16 = 0x3D5;

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[allow(dead_code)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

fn color_code(fg: Color, bg: Color) -> u8 {
    (bg as u8) << 4 | (fg as u8)
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ScreenChar {
    ascii_char: u8,
    color_code: u8,
}

#[repr(transparent)]
struct Buffer {
    chars: [[ScreenChar; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

pub struct Writer {
    column: usize,
    row: usize,
    color: u8,
    buffer: *mut Buffer,
}

// Safety: the single `Writer` instance is only ever reached through
// `CONSOLE`'s `Mutex`.
unsafe impl Send for Writer {}

impl Writer {
    fn new() -> Self {
        Writer {
            column: 0,
            row: 0,
            color: color_code(Color::White, Color::Black),
            buffer: VGA_BUFFER_ADDR as *mut Buffer,
        }
    }

    fn buffer(&mut self) -> &mut Buffer {
        unsafe { &mut *self.buffer }
    }

    pub fn set_colors(&mut self, fg: Color, bg: Color) {
        self.color = color_code(fg, bg);
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.column)
    }

    pub fn set_cursor(&mut self, row: usize, column: usize) {
        self.row = row.min(BUFFER_HEIGHT - 1);
        self.column = column.min(BUFFER_WIDTH - 1);
        self.update_cursor();
    }

    pub fn clear_screen(&mut self) {
        for row in 0..BUFFER_HEIGHT {
            self.clear_row(row);
        }
        self.row = 0;
        self.column = 0;
        self.update_cursor();
    }

    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            byte => {
                if self.column >= BUFFER_WIDTH {
                    self.new_line();
                }

                let (row, col, color) = (self.row, self.column, self.color);
                self.buffer().chars[row][col] = ScreenChar { ascii_char: byte, color_code: color };
                self.column += 1;
            }
        }

        self.update_cursor();
    }

    fn new_line(&mut self) {
        if self.row + 1 < BUFFER_HEIGHT {
            self.row += 1;
        } else {
            for row in 1..BUFFER_HEIGHT {
                self.buffer().chars[row - 1] = self.buffer().chars[row];
            }
            self.clear_row(BUFFER_HEIGHT - 1);
        }

        self.column = 0;
    }

    fn clear_row(&mut self, row: usize) {
        let blank = ScreenChar { ascii_char: b' ', color_code: self.color };
        self.buffer().chars[row] = [blank; BUFFER_WIDTH];
    }

    fn update_cursor(&self) {
        let pos = self.row * BUFFER_WIDTH + self.column;

        IoPort::write_u8(CURSOR_PORT_INDEX, 0x0F);
        IoPort::write_u8(CURSOR_PORT_DATA, (pos & 0xFF) as u8);
        IoPort::write_u8(CURSOR_PORT_INDEX, 0x0E);
        IoPort::write_u8(CURSOR_PORT_DATA, ((pos >> 8) & 0xFF) as u8);
    }
}

impl fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            match byte {
                0x20..=0x7e | b'\n' => self.write_byte(byte),
                _ => self.write_byte(0xfe),
            }
        }

        Ok(())
    }
}

pub static CONSOLE: Mutex<LazyCell<Writer>> = Mutex::new(LazyCell::new(Writer::new));
