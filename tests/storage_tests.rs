mod common;

use chrono::{Duration, Utc};
use common::TempDb;
use std::time::Duration as StdDuration;
use vetdesk::VetdeskError;
use vetdesk::db::{
    AppointmentPatch, AppointmentStatus, CartLine, NewAppointment, NewEmployee, NewInvoice,
    NewPatient, NewPayroll, NewPet, NewProduct, NewSocialAccount, OrderStatus, PatientPatch,
    PetPatch,
};
use vetdesk::social::Provider;

fn patient(name: &str) -> NewPatient {
    NewPatient {
        name: name.to_string(),
        email: Some(format!("{}@example.com", name.to_lowercase())),
        phone: Some("555-0100".to_string()),
        address: None,
    }
}

fn product(sku: &str, price_cents: i64, stock: i64) -> NewProduct {
    NewProduct {
        name: format!("Product {sku}"),
        sku: sku.to_string(),
        price_cents,
        stock,
    }
}

#[tokio::test]
async fn created_patient_reads_back_equal() {
    let db = TempDb::new("patient-read").await;
    let created = db.storage.create_patient(patient("Maria")).await.unwrap();
    let fetched = db.storage.get_patient(created.id).await.unwrap();
    assert_eq!(created, fetched);
    assert_eq!(fetched.email.as_deref(), Some("maria@example.com"));
    assert_eq!(created.created_at, created.updated_at);
}

#[tokio::test]
async fn patch_touches_only_given_fields_and_bumps_updated_at() {
    let db = TempDb::new("patient-patch").await;
    let created = db.storage.create_patient(patient("Maria")).await.unwrap();
    tokio::time::sleep(StdDuration::from_millis(20)).await;

    let updated = db
        .storage
        .update_patient(
            created.id,
            PatientPatch {
                phone: Some("555-0199".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.phone.as_deref(), Some("555-0199"));
    assert_eq!(updated.name, created.name);
    assert_eq!(updated.email, created.email);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at > created.updated_at);
}

#[tokio::test]
async fn missing_rows_are_not_found() {
    let db = TempDb::new("not-found").await;
    assert!(matches!(
        db.storage.get_patient(404).await,
        Err(VetdeskError::NotFound { entity: "patient", id: 404 })
    ));
    assert!(matches!(
        db.storage.update_pet(9, PetPatch::default()).await,
        Err(VetdeskError::NotFound { .. })
    ));
    let orphan = NewPet {
        patient_id: 77,
        name: "Rex".to_string(),
        species: "dog".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        db.storage.create_pet(orphan).await,
        Err(VetdeskError::NotFound { entity: "patient", .. })
    ));
}

#[tokio::test]
async fn blank_names_are_rejected() {
    let db = TempDb::new("validation").await;
    assert!(matches!(
        db.storage.create_patient(patient("   ")).await,
        Err(VetdeskError::Validation(_))
    ));
    let bad_period = NewPayroll {
        employee_id: 1,
        period: "2024-13".to_string(),
        gross_cents: 100,
    };
    assert!(matches!(
        db.storage.create_payroll(bad_period).await,
        Err(VetdeskError::Validation(_))
    ));
}

#[tokio::test]
async fn deleting_a_patient_removes_pets_appointments_and_invoices() {
    let db = TempDb::new("patient-cascade").await;
    let owner = db.storage.create_patient(patient("Maria")).await.unwrap();
    let other = db.storage.create_patient(patient("Joao")).await.unwrap();

    let rex = db
        .storage
        .create_pet(NewPet {
            patient_id: owner.id,
            name: "Rex".to_string(),
            species: "dog".to_string(),
            weight_kg: Some(21.5),
            ..Default::default()
        })
        .await
        .unwrap();
    let mia = db
        .storage
        .create_pet(NewPet {
            patient_id: other.id,
            name: "Mia".to_string(),
            species: "cat".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let visit = db
        .storage
        .create_appointment(NewAppointment {
            pet_id: rex.id,
            employee_id: None,
            scheduled_at: Utc::now() + Duration::days(1),
            reason: "vaccination".to_string(),
            notes: None,
        })
        .await
        .unwrap();
    let kept_visit = db
        .storage
        .create_appointment(NewAppointment {
            pet_id: mia.id,
            employee_id: None,
            scheduled_at: Utc::now() + Duration::days(2),
            reason: "checkup".to_string(),
            notes: None,
        })
        .await
        .unwrap();
    db.storage
        .create_invoice(NewInvoice {
            patient_id: owner.id,
            appointment_id: Some(visit.id),
            amount_cents: 4_500,
            due_on: None,
        })
        .await
        .unwrap();

    let removed = db.storage.delete_patient(owner.id).await.unwrap();
    assert_eq!(removed.pets, 1);
    assert_eq!(removed.appointments, 1);
    assert_eq!(removed.invoices, 1);

    assert!(db.storage.get_pet(rex.id).await.is_err());
    assert!(db.storage.get_appointment(visit.id).await.is_err());
    assert!(db.storage.list_invoices(owner.id).await.unwrap().is_empty());

    assert_eq!(db.storage.get_pet(mia.id).await.unwrap(), mia);
    assert_eq!(
        db.storage.get_appointment(kept_visit.id).await.unwrap().id,
        kept_visit.id
    );
    assert!(matches!(
        db.storage.delete_patient(owner.id).await,
        Err(VetdeskError::NotFound { .. })
    ));
}

#[tokio::test]
async fn deleting_an_employee_unassigns_appointments() {
    let db = TempDb::new("employee-cascade").await;
    let vet = db
        .storage
        .create_employee(NewEmployee {
            name: "Dr. Ana".to_string(),
            role: "veterinarian".to_string(),
            salary_cents: 900_000,
            ..Default::default()
        })
        .await
        .unwrap();
    db.storage
        .create_payroll(NewPayroll {
            employee_id: vet.id,
            period: "2024-05".to_string(),
            gross_cents: 900_000,
        })
        .await
        .unwrap();

    let owner = db.storage.create_patient(patient("Maria")).await.unwrap();
    let rex = db
        .storage
        .create_pet(NewPet {
            patient_id: owner.id,
            name: "Rex".to_string(),
            species: "dog".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let visit = db
        .storage
        .create_appointment(NewAppointment {
            pet_id: rex.id,
            employee_id: Some(vet.id),
            scheduled_at: Utc::now(),
            reason: "surgery".to_string(),
            notes: None,
        })
        .await
        .unwrap();
    let done = db
        .storage
        .update_appointment(
            visit.id,
            AppointmentPatch {
                status: Some(AppointmentStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(done.status, AppointmentStatus::Completed);
    assert_eq!(done.reason, "surgery");

    let removed = db.storage.delete_employee(vet.id).await.unwrap();
    assert_eq!(removed.payrolls, 1);
    assert_eq!(removed.unassigned_appointments, 1);

    let visit = db.storage.get_appointment(visit.id).await.unwrap();
    assert_eq!(visit.employee_id, None);
    assert!(db.storage.list_payrolls(vet.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn checkout_decrements_stock_and_prices_the_order() {
    let db = TempDb::new("checkout").await;
    let food = db.storage.create_product(product("FOOD-1", 2_500, 10)).await.unwrap();
    let toy = db.storage.create_product(product("TOY-1", 700, 3)).await.unwrap();

    let order = db
        .storage
        .checkout(
            "owner@example.com",
            &[
                CartLine { product_id: food.id, quantity: 2 },
                CartLine { product_id: toy.id, quantity: 1 },
                CartLine { product_id: food.id, quantity: 1 },
            ],
        )
        .await
        .unwrap();

    assert_eq!(order.order.status, OrderStatus::Pending);
    assert_eq!(order.order.total_cents, 3 * 2_500 + 700);
    assert_eq!(order.items.len(), 2);
    assert_eq!(db.storage.get_product(food.id).await.unwrap().stock, 7);
    assert_eq!(db.storage.get_product(toy.id).await.unwrap().stock, 2);
    assert_eq!(db.storage.get_order(order.order.id).await.unwrap(), order);
}

#[tokio::test]
async fn checkout_with_short_stock_changes_nothing() {
    let db = TempDb::new("checkout-rollback").await;
    let food = db.storage.create_product(product("FOOD-1", 2_500, 10)).await.unwrap();
    let toy = db.storage.create_product(product("TOY-1", 700, 1)).await.unwrap();

    let err = db
        .storage
        .checkout(
            "owner@example.com",
            &[
                CartLine { product_id: food.id, quantity: 4 },
                CartLine { product_id: toy.id, quantity: 2 },
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VetdeskError::InsufficientStock { requested: 2, available: 1, .. }
    ));

    assert_eq!(db.storage.get_product(food.id).await.unwrap().stock, 10);
    assert_eq!(db.storage.get_product(toy.id).await.unwrap().stock, 1);
    assert!(db.storage.list_orders(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn oversized_quantities_are_rejected_before_touching_stock() {
    let db = TempDb::new("checkout-qty-overflow").await;
    let food = db.storage.create_product(product("FOOD-1", 2_500, 10)).await.unwrap();

    let err = db
        .storage
        .checkout(
            "owner@example.com",
            &[
                CartLine { product_id: food.id, quantity: i64::MAX },
                CartLine { product_id: food.id, quantity: i64::MAX },
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VetdeskError::Validation(_)));

    assert_eq!(db.storage.get_product(food.id).await.unwrap().stock, 10);
    assert!(db.storage.list_orders(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn overflowing_order_total_rolls_back() {
    let db = TempDb::new("checkout-total-overflow").await;
    let food = db.storage.create_product(product("FOOD-1", 2_500, 10)).await.unwrap();
    let pricey = db.storage.create_product(product("GOLD-1", i64::MAX, 3)).await.unwrap();

    let err = db
        .storage
        .checkout(
            "owner@example.com",
            &[
                CartLine { product_id: food.id, quantity: 4 },
                CartLine { product_id: pricey.id, quantity: 2 },
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VetdeskError::Validation(_)));

    assert_eq!(db.storage.get_product(food.id).await.unwrap().stock, 10);
    assert_eq!(db.storage.get_product(pricey.id).await.unwrap().stock, 3);
    assert!(db.storage.list_orders(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancelling_an_order_restores_stock_once() {
    let db = TempDb::new("order-cancel").await;
    let food = db.storage.create_product(product("FOOD-1", 2_500, 5)).await.unwrap();
    let order = db
        .storage
        .checkout("owner@example.com", &[CartLine { product_id: food.id, quantity: 3 }])
        .await
        .unwrap();
    assert_eq!(db.storage.get_product(food.id).await.unwrap().stock, 2);

    let cancelled = db
        .storage
        .set_order_status(order.order.id, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(db.storage.get_product(food.id).await.unwrap().stock, 5);

    db.storage
        .set_order_status(order.order.id, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(db.storage.get_product(food.id).await.unwrap().stock, 5);

    assert!(matches!(
        db.storage.set_order_status(order.order.id, OrderStatus::Paid).await,
        Err(VetdeskError::Validation(_))
    ));
    assert!(matches!(
        db.storage.delete_product(food.id).await,
        Err(VetdeskError::Validation(_))
    ));
}

#[tokio::test]
async fn thread_history_is_bounded_and_ordered() {
    let db = TempDb::new("thread-history").await;
    let thread = db.storage.create_thread("Rex follow-up").await.unwrap();
    for i in 0..5 {
        db.storage
            .create_message(thread.id, "front desk", &format!("note {i}"))
            .await
            .unwrap();
    }

    let latest = db.storage.list_messages(thread.id, 3).await.unwrap();
    let bodies: Vec<&str> = latest.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["note 2", "note 3", "note 4"]);

    let summaries = db.storage.list_thread_summaries().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].message_count, 5);
    assert_eq!(
        summaries[0].last_message.as_ref().map(|m| m.body.as_str()),
        Some("note 4")
    );

    assert!(matches!(
        db.storage.create_message(999, "front desk", "lost").await,
        Err(VetdeskError::NotFound { entity: "thread", .. })
    ));
}

#[tokio::test]
async fn reconnecting_a_social_account_updates_in_place() {
    let db = TempDb::new("social-upsert").await;
    let first = db
        .storage
        .upsert_social_account(NewSocialAccount {
            provider: Provider::Facebook,
            account_id: "1020".to_string(),
            display_name: Some("Happy Paws".to_string()),
            access_token: "token-1".to_string(),
            refresh_token: None,
            token_secret: None,
            scope: None,
            expires_at: None,
        })
        .await
        .unwrap();
    let second = db
        .storage
        .upsert_social_account(NewSocialAccount {
            provider: Provider::Facebook,
            account_id: "1020".to_string(),
            display_name: Some("Happy Paws Clinic".to_string()),
            access_token: "token-2".to_string(),
            refresh_token: None,
            token_secret: None,
            scope: None,
            expires_at: None,
        })
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.access_token, "token-2");
    assert_eq!(second.display_name.as_deref(), Some("Happy Paws Clinic"));
    let all = db.storage.list_social_accounts(None).await.unwrap();
    assert_eq!(all.len(), 1);

    db.storage.delete_social_account(first.id).await.unwrap();
    assert!(matches!(
        db.storage.delete_social_account(first.id).await,
        Err(VetdeskError::NotFound { .. })
    ));
}

#[tokio::test]
async fn deleting_a_thread_removes_its_messages() {
    let db = TempDb::new("thread-delete").await;
    let thread = db.storage.create_thread("Rex follow-up").await.unwrap();
    let other = db.storage.create_thread("Luna vaccines").await.unwrap();
    for i in 0..3 {
        db.storage
            .create_message(thread.id, "front desk", &format!("note {i}"))
            .await
            .unwrap();
    }
    db.storage
        .create_message(other.id, "Dr. Ana", "booster due")
        .await
        .unwrap();

    assert_eq!(db.storage.delete_thread(thread.id).await.unwrap(), 3);

    assert!(matches!(
        db.storage.list_messages(thread.id, 10).await,
        Err(VetdeskError::NotFound { entity: "thread", .. })
    ));
    assert!(matches!(
        db.storage.delete_thread(thread.id).await,
        Err(VetdeskError::NotFound { entity: "thread", .. })
    ));

    let summaries = db.storage.list_thread_summaries().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].message_count, 1);
    assert_eq!(db.storage.list_messages(other.id, 10).await.unwrap().len(), 1);
}
