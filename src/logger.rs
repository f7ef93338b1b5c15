use crate::console::Color;
use crate::{print, println, serial_println};
use core::fmt;

pub struct LOGGER;

impl LOGGER {
    pub fn failed(fmt: fmt::Arguments) {
        print!(Color::White, Color::Black, "[");
        print!(Color::LightRed, Color::Black, "FAILED");
        println!(Color::White, Color::Black, "] {}", fmt);
        serial_println!("[FAILED] {}", fmt);
    }

    pub fn warn(fmt: fmt::Arguments) {
        print!(Color::White, Color::Black, "[");
        print!(Color::Yellow, Color::Black, " WARN ");
        println!(Color::White, Color::Black, "] {}", fmt);
        serial_println!("[ WARN ] {}", fmt);
    }

    pub fn ok(fmt: fmt::Arguments) {
        print!(Color::White, Color::Black, "[");
        print!(Color::LightGreen, Color::Black, "  OK  ");
        println!(Color::White, Color::Black, "] {}", fmt);
        serial_println!("[  OK  ] {}", fmt);
    }
}

#[macro_export]
macro_rules! log {
    ( $method:ident, $($arg:tt)* ) => {{
        use $crate::logger::LOGGER;
        LOGGER::$method(format_args!($($arg)*));
    }};
}
