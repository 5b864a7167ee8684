#![allow(dead_code)]

#[derive(calmform::FormModel)]
enum Choice {
    Yes,
    No,
}

fn main() {}
