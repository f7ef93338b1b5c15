#[macro_export]
macro_rules! println {
    ( $fg:path, $bg:path, $fmt:expr, $($arg:tt)* ) => {{ use $crate::print; print!($fg, $bg, concat!($fmt, "\n"), $($arg)*) }};
    ( $fg:path, $bg:path, $fmt:expr ) => {{ use $crate::print; print!($fg, $bg, concat!($fmt, "\n")) }};
    ( $fmt:expr, $($arg:tt)* ) => {{ use $crate::print; print!(concat!($fmt, "\n"), $($arg)*) }};
    ( $fmt:expr ) => {{ use $crate::print; print!(concat!($fmt, "\n")) }};
    () => {{ use $crate::print; print!("\n") }};
}

#[macro_export]
macro_rules! print {
    // colored print with args
    ( $fg:path, $bg:path, $fmt:expr, $($arg:tt)* ) => {{
        use core::{cell::LazyCell, fmt::Write};
        use $crate::console::CONSOLE;

        let writer = LazyCell::force_mut(&mut CONSOLE.lock());
        writer.set_colors($fg, $bg);
        writer.write_fmt(format_args!($fmt, $($arg)*)).unwrap();
        writer.set_colors($crate::console::Color::White, $crate::console::Color::Black);
    }};

    // colored print without args
    ( $fg:path, $bg:path, $fmt:expr ) => {
        print!($fg, $bg, concat!($fmt, "{}"), "");
    };

    // conventional print with args
    ( $fmt:expr, $($arg:tt)* ) => {{
        use core::{cell::LazyCell, fmt::Write};
        use $crate::console::CONSOLE;

        LazyCell::force_mut(&mut CONSOLE.lock()).write_fmt(format_args!($fmt, $($arg)*)).unwrap();
    }};

    // conventional print without args
    ( $fmt:expr ) => {{
        print!(concat!($fmt, "{}"), "");
    }};
}
