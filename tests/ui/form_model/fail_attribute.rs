#![allow(dead_code)]

#[derive(calmform::FormModel)]
struct Profile {
    #[form(skip)]
    name: String,
}

fn main() {}
