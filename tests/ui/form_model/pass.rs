use calmform::{FieldValue, FormModel};

#[derive(Clone, calmform::FormModel)]
struct Address {
    street: String,
    zip: Option<i64>,
}

#[derive(Clone, calmform::FormModel)]
struct DemoForm {
    email: String,
    newsletter: bool,
    #[form(nested)]
    address: Address,
}

fn main() {
    let fields = DemoForm::fields();
    assert_eq!(fields.email().to_string(), "email");
    assert_eq!(fields.address().street().to_string(), "address.street");

    let model = DemoForm {
        email: "a@calm.form".to_string(),
        newsletter: true,
        address: Address {
            street: "Main".to_string(),
            zip: None,
        },
    };
    let state = model.to_form_state();
    assert_eq!(
        state.get_path(&fields.address().zip()),
        Some(&FieldValue::Null)
    );

    let restored = DemoForm::from_form_state(&state).expect("state fits model");
    assert_eq!(restored.email, "a@calm.form");
    assert!(restored.newsletter);
    assert_eq!(restored.address.street, "Main");
}
