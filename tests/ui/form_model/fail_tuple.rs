#![allow(dead_code)]

#[derive(calmform::FormModel)]
struct Pair(String, String);

fn main() {}
