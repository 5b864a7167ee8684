#![allow(dead_code)]

#[derive(calmform::FormModel)]
struct Wrapper<T> {
    value: T,
}

fn main() {}
