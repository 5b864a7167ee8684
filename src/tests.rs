use super::*;
use chrono::{DateTime, TimeZone, Utc};
use futures::executor::block_on;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, FormModel)]
struct Person {
    name: String,
    nickname: Option<String>,
}

#[derive(Clone, Debug, PartialEq, FormModel)]
struct Signup {
    email: String,
    role: String,
    racoon: bool,
    #[form(nested)]
    person: Person,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn signup_state() -> FormState {
    FormState::new()
        .with("email", "")
        .with("role", "")
        .with("racoon", false)
}

fn nested_state() -> FormState {
    FormState::new().with("title", "Dr").with(
        "person",
        FormState::new()
            .with("name", "Ada")
            .with("city", "London")
            .with("address", FormState::new().with("street", "Main")),
    )
}

fn path(value: &str) -> FieldPath {
    FieldPath::parse(value).expect("valid path")
}

fn email_validator(value: &FieldValue, _state: &FormState) -> Result<(), String> {
    let text = value.as_text().unwrap_or_default();
    if text.len() < 5 {
        return Err("Email must be at least 5 characters long".into());
    }
    if !text.contains('@') {
        return Err("Email must contain @".into());
    }
    Ok(())
}

fn year_2000() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
        .single()
        .expect("valid date")
}

#[test]
fn email_scenario_reports_live_errors_for_touched_field() {
    init_tracing();
    let form = FormController::new(signup_state()).expect("build form");
    let email = form
        .register(
            "email",
            FieldOptions::new().required(true).validate(email_validator),
        )
        .expect("register email");

    email.on_change.call("a@b.com").expect("change email");
    assert!(form.is_touched("email").expect("touched"));
    assert_eq!(
        form.state().expect("state").get("email"),
        Some(&FieldValue::from("a@b.com"))
    );
    assert_eq!(form.field_error("email").expect("error"), None);

    email.on_change.call("x").expect("change email");
    assert_eq!(
        form.field_error("email").expect("error"),
        Some("Email must be at least 5 characters long".to_string())
    );

    email.on_change.call("abcdef").expect("change email");
    assert_eq!(
        form.field_error("email").expect("error"),
        Some("Email must contain @".to_string())
    );

    let rerendered = form
        .register(
            "email",
            FieldOptions::new().required(true).validate(email_validator),
        )
        .expect("register email again");
    assert!(rerendered.error);
    assert_eq!(
        rerendered.helper_text.as_deref(),
        Some("Email must contain @")
    );
    assert_eq!(rerendered.value(), Some(&FieldValue::from("abcdef")));
}

#[test]
fn required_error_waits_for_touch() {
    let form = FormController::new(signup_state()).expect("build form");
    let email = form
        .register("email", FieldOptions::new().required(true))
        .expect("register email");
    let role = form
        .register("role", FieldOptions::new().required(true))
        .expect("register role");

    role.on_change.call("admin").expect("change role");
    assert_eq!(form.field_error("email").expect("email error"), None);

    email.on_change.call("").expect("clear email");
    assert_eq!(
        form.field_error("email").expect("email error"),
        Some(DEFAULT_REQUIRED_FIELD_ERROR_MESSAGE.to_string())
    );
}

#[test]
fn required_check_short_circuits_validator() {
    let calls = Arc::new(AtomicUsize::new(0));
    let form = FormController::new(signup_state()).expect("build form");
    let counter = calls.clone();
    let email = form
        .register(
            "email",
            FieldOptions::new()
                .required(true)
                .validate(move |_value: &FieldValue, _state: &FormState| -> Result<(), String> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("validator ran".to_string())
                }),
        )
        .expect("register email");

    email.on_change.call("").expect("change email");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        form.field_error("email").expect("error"),
        Some("Field is required".to_string())
    );
}

#[test]
fn configured_required_message_replaces_default() {
    let form = FormController::builder()
        .defaults(signup_state())
        .config(FormConfig::new().required_field_error_message("Bitte ausfüllen"))
        .build()
        .expect("build form");
    form.register("email", FieldOptions::new().required(true))
        .expect("register email");

    assert!(!form.force_validate().expect("force validate"));
    assert_eq!(
        form.field_error("email").expect("error"),
        Some("Bitte ausfüllen".to_string())
    );
}

#[test]
fn format_is_applied_before_storing() {
    let form = FormController::new(signup_state()).expect("build form");
    let email = form
        .register(
            "email",
            FieldOptions::new().format(|raw: FieldValue| match raw {
                FieldValue::Text(text) => FieldValue::Text(text.trim().to_lowercase()),
                other => other,
            }),
        )
        .expect("register email");

    email
        .on_change
        .call(ChangeEvent::value("  Ada@Example.COM "))
        .expect("change email");
    assert_eq!(
        form.state().expect("state").get("email"),
        Some(&FieldValue::from("ada@example.com"))
    );
    assert!(form.is_touched("email").expect("touched"));
}

#[test]
fn boolean_fields_bind_through_checked() {
    let form = FormController::new(signup_state()).expect("build form");
    let racoon = form
        .register("racoon", FieldOptions::new())
        .expect("register racoon");
    assert_eq!(racoon.mode(), FieldMode::Checkbox);
    assert_eq!(racoon.checked(), Some(false));
    assert_eq!(racoon.value(), None);

    racoon
        .on_change
        .call(ChangeEvent::checked(true))
        .expect("check racoon");
    let racoon = form
        .register("racoon", FieldOptions::new())
        .expect("register racoon");
    assert_eq!(racoon.checked(), Some(true));
    assert!(!form.settings("racoon").expect("settings").expect("registered").required);
}

#[test]
fn force_validate_touches_everything_and_reports_validity() {
    let form = FormController::new(signup_state()).expect("build form");
    form.register(
        "email",
        FieldOptions::new().required(true).validate(email_validator),
    )
    .expect("register email");
    form.register("role", FieldOptions::new())
        .expect("register role");

    assert!(!form.is_any_touched().expect("any touched"));
    assert!(!form.force_validate().expect("force validate"));
    let touched = form.touched().expect("touched");
    assert!(touched.leaves().iter().all(|(_, touched)| **touched));
    assert_eq!(
        form.errors().expect("errors").messages(),
        vec![(path("email"), "Field is required".to_string())]
    );

    form.set_state(signup_state().with("email", "ada@example.com"))
        .expect("set state");
    assert!(form.force_validate().expect("force validate"));
    assert!(form.errors().expect("errors").is_valid());
}

#[test]
fn birth_date_scenario() {
    let form = FormController::new(FormState::new().with("birth", Utc::now()))
        .expect("build form");
    let birth = form
        .register(
            "birth",
            FieldOptions::new()
                .required(true)
                .validate(|value: &FieldValue, _state: &FormState| -> Result<(), String> {
                    match value.as_date() {
                        Some(date) if date < year_2000() => {
                            Err("birth date must be after 2000".to_string())
                        }
                        _ => Ok(()),
                    }
                }),
        )
        .expect("register birth");

    assert!(form.force_validate().expect("force validate"));

    let date = Utc
        .with_ymd_and_hms(1990, 1, 1, 0, 0, 0)
        .single()
        .expect("valid date");
    birth.on_change.call(date).expect("change birth");
    assert!(!form.force_validate().expect("force validate"));
    assert_eq!(
        form.field_error("birth").expect("error"),
        Some("birth date must be after 2000".to_string())
    );
}

#[test]
fn disabled_fields_are_never_validated() {
    let form = FormController::new(signup_state()).expect("build form");
    form.register("email", FieldOptions::new().required(true).disabled(true))
        .expect("register email");

    assert!(form.force_validate().expect("force validate"));
    let email = form
        .register("email", FieldOptions::new().required(true).disabled(true))
        .expect("register email");
    assert!(email.disabled);
    assert!(!email.error);
}

#[test]
fn helper_text_overrides_error_message() {
    let form = FormController::new(signup_state()).expect("build form");
    form.register("email", FieldOptions::new().required(true))
        .expect("register email");
    form.force_validate().expect("force validate");

    let email = form
        .register(
            "email",
            FieldOptions::new()
                .required(true)
                .helper_text("We never share it"),
        )
        .expect("register email");
    assert!(email.error);
    assert_eq!(email.helper_text.as_deref(), Some("We never share it"));
}

#[test]
fn last_registration_wins() {
    let form = FormController::new(signup_state()).expect("build form");
    form.register(
        "role",
        FieldOptions::new()
            .validate(|_value: &FieldValue, _state: &FormState| -> Result<(), String> {
                Err("first".to_string())
            }),
    )
    .expect("register role");
    form.register(
        "role",
        FieldOptions::new()
            .validate(|_value: &FieldValue, _state: &FormState| -> Result<(), String> {
                Err("second".to_string())
            }),
    )
    .expect("register role again");

    form.force_validate().expect("force validate");
    assert_eq!(
        form.field_error("role").expect("error"),
        Some("second".to_string())
    );
}

#[test]
fn clear_restores_baseline_and_derived_state() {
    let form = FormController::new(signup_state()).expect("build form");
    let email = form
        .register("email", FieldOptions::new().required(true))
        .expect("register email");
    let racoon = form
        .register("racoon", FieldOptions::new())
        .expect("register racoon");

    assert!(!form.is_changed().expect("changed"));
    email.on_change.call("").expect("change email");
    racoon.on_change.call(true).expect("change racoon");
    form.force_validate().expect("force validate");
    assert!(form.is_changed().expect("changed"));

    form.clear().expect("clear");
    let snapshot = form.snapshot().expect("snapshot");
    assert_eq!(snapshot.state, signup_state());
    assert!(snapshot.is_valid);
    assert!(!snapshot.is_changed);
    assert!(!snapshot.is_any_touched);
    for (leaf, message) in snapshot.errors.leaves() {
        assert_eq!(message, &None, "error left on {leaf}");
    }
}

#[test]
fn changing_back_to_baseline_is_not_a_change() {
    let form = FormController::new(signup_state()).expect("build form");
    let role = form
        .register("role", FieldOptions::new())
        .expect("register role");

    role.on_change.call("admin").expect("change role");
    assert!(form.is_changed().expect("changed"));
    role.on_change.call("").expect("change role back");
    assert!(!form.is_changed().expect("changed"));
    assert!(form.is_any_touched().expect("touched"));
}

#[test]
fn nested_write_leaves_siblings_untouched() {
    let form = FormController::new(nested_state()).expect("build form");
    let before = form.state().expect("state");
    let name = form
        .register("person.name", FieldOptions::new().required(true))
        .expect("register name");
    assert_eq!(name.name, "person.name");
    assert_eq!(name.value(), Some(&FieldValue::from("Ada")));

    name.on_change.call("Grace").expect("change name");
    let after = form.state().expect("state");
    assert_eq!(
        after.get_path(&path("person.name")),
        Some(&FieldValue::from("Grace"))
    );
    assert_eq!(
        after.get_path(&path("person.city")),
        Some(&FieldValue::from("London"))
    );
    assert_eq!(after.get("title"), before.get("title"));

    let address_before = before
        .get_path(&path("person.address"))
        .and_then(FieldValue::as_object)
        .expect("address before");
    let address_after = after
        .get_path(&path("person.address"))
        .and_then(FieldValue::as_object)
        .expect("address after");
    assert!(address_after.shares_entries_with(address_before));

    assert!(form.is_touched("person.name").expect("touched"));
    assert!(!form.is_touched("person.city").expect("touched"));

    form.clear().expect("clear");
    assert_eq!(form.state().expect("state"), nested_state());
}

#[test]
fn nested_errors_mirror_the_state_shape() {
    let form = FormController::new(nested_state()).expect("build form");
    form.register("person.address.street", FieldOptions::new().required(true))
        .expect("register street");
    let cleared = nested_state()
        .set_path(&path("person.address.street"), "".into())
        .expect("write street");
    form.set_state(cleared).expect("set state");

    assert!(!form.force_validate().expect("force validate"));
    let errors = form.errors().expect("errors");
    assert!(matches!(errors.slot("person"), Some(Slot::Branch(_))));
    assert_eq!(
        errors.get(&path("person.address.street")),
        Some(&Some("Field is required".to_string()))
    );
    assert_eq!(errors.get(&path("person.name")), Some(&None));
    assert_eq!(errors.get(&path("person")), None);
}

#[test]
fn object_and_leaf_prefixed_paths_are_rejected() {
    let form = FormController::new(nested_state()).expect("build form");
    assert!(matches!(
        form.register("person", FieldOptions::new()),
        Err(FormError::InvalidPath { .. })
    ));
    assert!(matches!(
        form.register("title.first", FieldOptions::new()),
        Err(FormError::InvalidPath { .. })
    ));
    assert!(matches!(
        form.register("person..name", FieldOptions::new()),
        Err(FormError::InvalidPath { .. })
    ));
}

#[test]
fn escape_hatch_does_not_touch_fields() {
    let form = FormController::new(signup_state()).expect("build form");
    form.register(
        "email",
        FieldOptions::new().required(true).validate(email_validator),
    )
    .expect("register email");

    form.update_state(|previous| previous.clone().with("email", "x"))
        .expect("update state");
    assert_eq!(
        form.state().expect("state").get("email"),
        Some(&FieldValue::from("x"))
    );
    assert!(!form.is_touched("email").expect("touched"));
    assert_eq!(form.field_error("email").expect("error"), None);
    assert!(form.is_changed().expect("changed"));
}

#[test]
fn dynamic_fields_default_to_optional_and_extend_the_shape() {
    let form = FormController::new(FormState::new()).expect("build form");
    let nickname = form
        .register("nickname", FieldOptions::new())
        .expect("register nickname");
    assert_eq!(nickname.value(), Some(&FieldValue::from("")));
    let newsletter = form
        .register("newsletter", FieldOptions::new().default_value(true))
        .expect("register newsletter");
    assert_eq!(newsletter.checked(), Some(true));

    assert!(form.force_validate().expect("force validate"));
    assert!(form.is_touched("nickname").expect("touched"));
    assert!(form.baseline().is_empty());

    let code = form
        .register("code", FieldOptions::new().required(true))
        .expect("register code");
    assert!(!form.force_validate().expect("force validate"));
    code.on_change.call("1234").expect("change code");
    assert_eq!(form.field_error("code").expect("error"), None);
}

#[test]
fn typed_models_default_to_required() {
    let signup = Signup {
        email: String::new(),
        role: "guest".into(),
        racoon: false,
        person: Person {
            name: "Ada".into(),
            nickname: None,
        },
    };
    let form = FormController::from_model(&signup).expect("build form");
    let fields = Signup::fields();
    assert_eq!(fields.person().name().to_string(), "person.name");

    form.register(fields.email(), FieldOptions::new())
        .expect("register email");
    form.register(fields.racoon(), FieldOptions::new())
        .expect("register racoon");
    form.register(fields.person().nickname(), FieldOptions::new().required(false))
        .expect("register nickname");

    assert!(!form.force_validate().expect("force validate"));
    assert_eq!(
        form.errors().expect("errors").messages(),
        vec![(fields.email(), "Field is required".to_string())]
    );

    let email = form
        .register(fields.email(), FieldOptions::new())
        .expect("register email");
    email.on_change.call("ada@example.com").expect("change email");
    assert!(form.force_validate().expect("force validate"));

    let model = form.model::<Signup>().expect("typed model");
    assert_eq!(model.email, "ada@example.com");
    assert_eq!(model.person, signup.person);
}

#[test]
fn required_default_can_be_overridden() {
    let form = FormController::builder()
        .defaults(signup_state())
        .required_by_default(true)
        .build()
        .expect("build form");
    form.register("role", FieldOptions::new())
        .expect("register role");
    assert!(form.settings("role").expect("settings").expect("registered").required);
}

#[test]
fn builder_rejects_ambiguous_sources() {
    assert!(matches!(
        FormController::builder().build(),
        Err(FormError::MissingSource)
    ));
    assert!(matches!(
        FormController::builder()
            .defaults(signup_state())
            .store(StateCell::new(signup_state()))
            .build(),
        Err(FormError::ConflictingSource)
    ));
    assert!(matches!(
        FormController::builder()
            .store(StateCell::new(signup_state()))
            .hash(InMemoryLocation::new(), "form")
            .build(),
        Err(FormError::HashRequiresDefaults)
    ));
}

#[test]
fn external_cell_provides_baseline_and_is_shared() {
    let cell = StateCell::new(signup_state().with("role", "admin"));
    let first = FormController::builder()
        .store(cell.clone())
        .build()
        .expect("build first form");
    let second = FormController::builder()
        .store(cell.clone())
        .build()
        .expect("build second form");
    assert_eq!(first.baseline().get("role"), Some(&FieldValue::from("admin")));

    let email = first
        .register("email", FieldOptions::new())
        .expect("register email");
    email.on_change.call("ada@example.com").expect("change email");
    assert_eq!(
        second.state().expect("state").get("email"),
        Some(&FieldValue::from("ada@example.com"))
    );
    assert_eq!(
        cell.get().expect("cell").get("email"),
        Some(&FieldValue::from("ada@example.com"))
    );
    assert!(first.is_touched("email").expect("touched"));
    assert!(!second.is_touched("email").expect("touched"));
}

#[test]
fn dropping_every_handle_unsubscribes_from_external_cell() {
    let cell = StateCell::new(signup_state());
    let form = FormController::builder()
        .store(cell.clone())
        .build()
        .expect("build form");
    let email = form
        .register("email", FieldOptions::new())
        .expect("register email");
    assert_eq!(cell.listener_count().expect("listeners"), 1);

    drop(form);
    assert_eq!(cell.listener_count().expect("listeners"), 1);
    drop(email);
    assert_eq!(cell.listener_count().expect("listeners"), 0);
}

#[test]
fn each_commit_notifies_listeners_once() {
    let cell = StateCell::new(signup_state());
    let commits = Arc::new(AtomicUsize::new(0));
    let counter = commits.clone();
    let _subscription = cell
        .subscribe(Arc::new(move |_commit: &Committed| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .expect("subscribe");
    let form = FormController::builder()
        .store(cell.clone())
        .build()
        .expect("build form");
    let email = form
        .register("email", FieldOptions::new())
        .expect("register email");

    email.on_change.call("a").expect("change email");
    assert_eq!(commits.load(Ordering::SeqCst), 1);
}

#[test]
fn hash_store_round_trips_state() {
    let birth = year_2000();
    let state = signup_state()
        .with("email", "ada@example.com")
        .with("birth", birth)
        .with("age", Decimal::new(425, 1))
        .with("person", FormState::new().with("name", "Ada").with("nickname", FieldValue::Null));
    let shape = signup_state()
        .with("birth", Utc::now())
        .with("person", FormState::new());

    let decoded = decode_state(&encode_state(&state), &shape).expect("decode");
    assert_eq!(decoded, state);
}

#[test]
fn hash_store_writes_through_and_reloads() {
    let location = InMemoryLocation::with_fragment("tab=profile");
    let form = FormController::builder()
        .defaults(signup_state())
        .hash(location.clone(), "signup")
        .build()
        .expect("build form");
    let email = form
        .register("email", FieldOptions::new())
        .expect("register email");
    email.on_change.call("ada@example.com").expect("change email");
    assert_eq!(location.replacements(), 1);

    let fragment = location.fragment().expect("fragment");
    assert!(fragment.starts_with("tab=profile&signup="));

    let reloaded = FormController::builder()
        .defaults(signup_state())
        .hash(location.clone(), "signup")
        .build()
        .expect("reload form");
    assert_eq!(reloaded.state().expect("state"), form.state().expect("state"));
    assert!(!reloaded.baseline().get("email").is_some_and(FieldValue::is_truthy));

    form.clear().expect("clear");
    assert_eq!(location.fragment().expect("fragment"), "tab=profile");
    assert_eq!(form.state().expect("state"), signup_state());
}

#[test]
fn hash_store_ignores_undecodable_payload() {
    init_tracing();
    let location = InMemoryLocation::with_fragment("signup=not-json");
    let form = FormController::builder()
        .defaults(signup_state())
        .hash(location, "signup")
        .build()
        .expect("build form");
    assert_eq!(form.state().expect("state"), signup_state());
}

#[test]
fn debounced_hash_writes_keep_latest_value() {
    let location = InMemoryLocation::new();
    let form = FormController::builder()
        .defaults(signup_state())
        .hash(location.clone(), "signup")
        .debounce(Duration::from_millis(40))
        .build()
        .expect("build form");
    let email = form
        .register("email", FieldOptions::new())
        .expect("register email");

    let first = {
        let form = form.clone();
        let email = email.on_change.clone();
        thread::spawn(move || {
            email.call("first@example.com").expect("first change");
            block_on(form.flush_debounced()).expect("first flush");
        })
    };
    thread::sleep(Duration::from_millis(5));
    let second = {
        let form = form.clone();
        let email = email.on_change.clone();
        thread::spawn(move || {
            email.call("second@example.com").expect("second change");
            block_on(form.flush_debounced()).expect("second flush");
        })
    };

    first.join().expect("first thread joins");
    second.join().expect("second thread joins");

    assert_eq!(location.replacements(), 1);
    let reloaded = HashStore::open(location, "signup", signup_state(), Duration::ZERO)
        .expect("reopen store");
    assert_eq!(
        reloaded.get().expect("state").get("email"),
        Some(&FieldValue::from("second@example.com"))
    );
}

#[test]
fn explicit_flush_skips_the_debounce() {
    let location = InMemoryLocation::new();
    let form = FormController::builder()
        .defaults(signup_state())
        .hash(location.clone(), "signup")
        .debounce(Duration::from_secs(60))
        .build()
        .expect("build form");
    form.register("role", FieldOptions::new())
        .expect("register role")
        .on_change
        .call("admin")
        .expect("change role");
    assert_eq!(location.replacements(), 0);

    form.flush().expect("flush");
    assert_eq!(location.replacements(), 1);
    form.flush().expect("flush again");
    assert_eq!(location.replacements(), 1);
}

#[test]
fn numeric_values_are_falsy_at_zero() {
    let form = FormController::new(FormState::new().with("age", Decimal::ZERO))
        .expect("build form");
    let age = form
        .register("age", FieldOptions::new().required(true))
        .expect("register age");
    assert!(!form.force_validate().expect("force validate"));
    age.on_change.call(Decimal::new(42, 0)).expect("change age");
    assert_eq!(form.field_error("age").expect("error"), None);
}

#[test]
fn errors_of_a_superseded_commit_are_dropped() {
    let form = FormController::new(signup_state()).expect("build form");
    let email = form
        .register("email", FieldOptions::new().validate(email_validator))
        .expect("register email");
    email.on_change.call("ada@example.com").expect("change email");
    let latest = form.store.committed().expect("committed");

    let stale = Committed {
        revision: latest.revision - 1,
        state: signup_state().with("email", "x"),
    };
    form.engine.recompute(&stale).expect("late recompute");

    assert_eq!(form.field_error("email").expect("error"), None);
}

#[test]
fn concurrent_writers_leave_errors_of_the_final_state() {
    let form = FormController::new(signup_state()).expect("build form");
    let email = form
        .register("email", FieldOptions::new().validate(email_validator))
        .expect("register email");
    email.on_change.call("seed@example.com").expect("touch email");

    let writers = (0..4)
        .map(|writer| {
            let form = form.clone();
            thread::spawn(move || {
                for step in 0..50 {
                    let email = if (writer + step) % 2 == 0 {
                        format!("bad{step}")
                    } else {
                        format!("good{writer}-{step}@example.com")
                    };
                    form.set_state(signup_state().with("email", email))
                        .expect("concurrent write");
                }
            })
        })
        .collect::<Vec<_>>();
    for writer in writers {
        writer.join().expect("writer joins");
    }

    let expected = form
        .engine
        .validate(&form.state().expect("state"), true)
        .expect("validate final state");
    assert_eq!(form.errors().expect("errors"), expected);
}

#[test]
fn rejected_change_leaves_field_untouched() {
    let form = FormController::new(nested_state()).expect("build form");
    let name = form
        .register("person.name", FieldOptions::new().required(true))
        .expect("register name");
    form.update_state(|previous| previous.clone().with("person", "flattened"))
        .expect("flatten person");

    assert!(matches!(
        name.on_change.call("Grace"),
        Err(FormError::InvalidPath { .. })
    ));
    assert!(!form.is_touched("person.name").expect("touched"));
    assert_eq!(
        form.state().expect("state").get("person"),
        Some(&FieldValue::from("flattened"))
    );
}

#[test]
fn rejected_change_on_a_dynamic_field_drops_its_touched_flag() {
    let form = FormController::new(FormState::new().with("meta", "plain")).expect("build form");
    let extra = form
        .register("extra.note", FieldOptions::new())
        .expect("register note");
    form.update_state(|previous| previous.clone().with("extra", "flat"))
        .expect("flatten extra");

    assert!(extra.on_change.call("hi").is_err());
    assert!(!form.is_touched("extra.note").expect("touched"));
    assert_eq!(form.touched().expect("touched").get(&path("extra.note")), None);
}
