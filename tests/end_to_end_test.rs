//! A work order from check-in to pickup, plus the double-start race.

use arycar::engine::Engine;
use arycar::error::Error;
use arycar::model::*;

fn video(media_type: MediaType, key: &str) -> NewMedia {
    NewMedia::new(media_type, BlobRef::new("arycar-media", key), "video/mp4", 5_242_880)
}

#[tokio::test]
async fn check_in_to_pickup() {
    let engine = Engine::in_memory();
    let attendant = UserId::new();
    let wash = ServiceId::new();

    // Check-in
    let order = engine
        .create_work_order(NewWorkOrder::new("ABC1D23", "11999998888").service(wash, 2), attendant)
        .await
        .unwrap();
    assert_eq!(order.status, Status::Created);

    let events = engine.events(order.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Created);

    let detail = engine.detail(order.id).await.unwrap();
    assert_eq!(detail.services.len(), 1);
    assert_eq!(detail.services[0].service_id, wash);
    assert_eq!(detail.services[0].quantity, 2);

    // Entry evidence, then start
    engine
        .attach_media(order.id, video(MediaType::EntryVideoExternal, "in/ext.mp4"), attendant)
        .await
        .unwrap();
    engine
        .attach_media(order.id, video(MediaType::EntryVideoInternal, "in/int.mp4"), attendant)
        .await
        .unwrap();

    let started = engine
        .request_transition(order.id, Status::InProgress, attendant)
        .await
        .unwrap();
    assert_eq!(started.status, Status::InProgress);
    assert!(started.started_at.is_some());

    // Job done
    let ready = engine
        .request_transition(order.id, Status::Ready, attendant)
        .await
        .unwrap();
    assert_eq!(ready.status, Status::Ready);
    assert!(ready.ready_at.is_some());

    // Handover without the delivery video is refused
    let err = engine
        .request_transition(order.id, Status::Delivered, attendant)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::GuardNotSatisfied { .. }), "{err:?}");
    assert_eq!(engine.get(order.id).await.unwrap().status, Status::Ready);

    engine
        .attach_media(order.id, video(MediaType::DeliveryVideo, "out/delivery.mp4"), attendant)
        .await
        .unwrap();
    let delivered = engine
        .request_transition(order.id, Status::Delivered, attendant)
        .await
        .unwrap();
    assert_eq!(delivered.status, Status::Delivered);
    assert!(delivered.delivered_at.is_some());

    // Closed for edits
    let err = engine
        .update_notes(order.id, "late remark", attendant)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Immutable { status: Status::Delivered }));

    let detail = engine.detail(order.id).await.unwrap();
    assert_eq!(detail.media.len(), 3);
    assert_eq!(detail.order.notes, None);
    assert_eq!(detail.vehicle.plate, "ABC1D23");
    assert_eq!(detail.customer.phone, "11999998888");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn double_start_has_one_winner() {
    let engine = Engine::in_memory();
    let attendant = UserId::new();

    let order = engine
        .create_work_order(
            NewWorkOrder::new("ABC1D23", "11999998888").service(ServiceId::new(), 1),
            attendant,
        )
        .await
        .unwrap();
    engine
        .attach_media(order.id, video(MediaType::EntryVideoExternal, "a.mp4"), attendant)
        .await
        .unwrap();
    engine
        .attach_media(order.id, video(MediaType::EntryVideoInternal, "b.mp4"), attendant)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        engine.request_transition(order.id, Status::InProgress, attendant),
        engine.request_transition(order.id, Status::InProgress, attendant),
    );

    let results = [a, b];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "{results:?}");

    for result in &results {
        if let Err(e) = result {
            assert!(
                matches!(
                    e,
                    Error::InvalidTransition { .. }
                        | Error::TerminalState { .. }
                        | Error::ConcurrentModification { .. }
                ),
                "{e:?}"
            );
        }
    }

    let started = engine
        .events(order.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.to_status == Some(Status::InProgress))
        .count();
    assert_eq!(started, 1);
}
