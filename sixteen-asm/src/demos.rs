//! Bundled demo programs, selectable by name from the command line.

pub const DEMOS: &[(&str, &str)] = &[
    ("countdown", include_str!("../demos/countdown.asm")),
    ("subroutine", include_str!("../demos/subroutine.asm")),
    ("banking", include_str!("../demos/banking.asm")),
    ("screen", include_str!("../demos/screen.asm")),
    ("structs", include_str!("../demos/structs.asm")),
];

pub fn find(name: &str) -> Option<&'static str> {
    DEMOS
        .iter()
        .find(|(demo, _)| demo.eq_ignore_ascii_case(name))
        .map(|(_, src)| *src)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    DEMOS.iter().map(|(name, _)| *name)
}
