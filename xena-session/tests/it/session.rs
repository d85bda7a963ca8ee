use std::time::Duration;

use xena_session::{Error, Kind, Reservation, Session};

use crate::fake::{FakeChassis, PASSWORD};

pub async fn connect(chassis: &FakeChassis, owner: &str) -> Session {
    let mut session: Session = Session::default();
    session.add_chassis(&chassis.addr, owner, PASSWORD).await.unwrap();
    session
}

#[tokio::test]
async fn inventory_is_idempotent() {
    let _ = tracing_subscriber::fmt::try_init();

    let chassis = FakeChassis::spawn(&[2, 0, 1]).await;
    let mut session = connect(&chassis, "alice").await;

    session.inventory().await.unwrap();
    let ports = session.ports();
    let names = ports.iter().map(|(name, _)| name.clone()).collect::<Vec<_>>();
    assert_eq!(
        names,
        [
            format!("{}/0/0", chassis.addr),
            format!("{}/0/1", chassis.addr),
            format!("{}/2/0", chassis.addr),
        ]
    );

    let size = session.tree().len();
    session.inventory().await.unwrap();
    assert_eq!(session.ports(), ports);
    assert_eq!(session.tree().len(), size);

    let (_, chassis_id) = session.chassis_list()[0].clone();
    assert_eq!(session.modules(chassis_id).len(), 2);

    // inventory caches the default port attributes
    let port = session.port(&chassis.location(2, 0)).unwrap().unwrap();
    assert_eq!(session.node(port).unwrap().cached("p_reservation"), Some("RELEASED"));
    assert_eq!(session.node(port).unwrap().cached("p_receivesync"), Some("IN_SYNC"));
}

#[tokio::test]
async fn rejected_logon_leaves_no_chassis() {
    let _ = tracing_subscriber::fmt::try_init();

    let chassis = FakeChassis::spawn(&[1]).await;
    let mut session: Session = Session::default();

    let err = session.add_chassis(&chassis.addr, "alice", "wrong").await.unwrap_err();
    assert!(err.is_protocol(), "{err:?}");
    assert!(session.chassis_list().is_empty());
    assert!(session.tree().is_empty());

    session.add_chassis(&chassis.addr, "alice", PASSWORD).await.unwrap();
    let err = session.add_chassis(&chassis.addr, "alice", PASSWORD).await.unwrap_err();
    assert!(matches!(err, Error::Duplicate { kind: Kind::Chassis, .. }));

    let err = session.add_chassis("10.0.0.1", "", PASSWORD).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn unreachable_chassis_is_a_connection_error() {
    let _ = tracing_subscriber::fmt::try_init();

    // Bind and drop a listener to get a port nobody listens on.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let mut session: Session = Session::default();
    let err = session.add_chassis(&addr, "alice", PASSWORD).await.unwrap_err();
    assert!(err.is_connection(), "{err:?}");
    assert!(session.chassis_list().is_empty());
}

#[tokio::test]
async fn reservation_conflict_and_takeover() {
    let _ = tracing_subscriber::fmt::try_init();

    let chassis = FakeChassis::spawn(&[2]).await;
    chassis.state.lock().port(0, 1).reserved_by = "bob".to_string();

    let mut session = connect(&chassis, "alice").await;
    let location = chassis.location(0, 1);

    let err = session.reserve_ports(&[location.as_str()], false).await.unwrap_err();
    match err {
        Error::ReservationConflict { port, owner } => {
            assert_eq!(port, location);
            assert_eq!(owner, "bob");
        }
        e => panic!("expected a reservation conflict, got {e:?}"),
    }
    assert_eq!(chassis.state.lock().port(0, 1).reserved_by, "bob");

    let ports = session.reserve_ports(&[location.as_str()], true).await.unwrap();
    assert_eq!(ports.len(), 1);
    assert_eq!(session.reservation(ports[0]).await.unwrap(), Reservation::ReservedByYou);
    assert_eq!(session.reserved_by(ports[0]).await.unwrap(), "alice");
    assert!(chassis.commands().iter().any(|c| c.ends_with("p_reservation relinquish")));

    // reserving resets the port
    assert_eq!(chassis.state.lock().port(0, 1).resets, 1);
}

#[tokio::test]
async fn invalid_locations_send_nothing() {
    let _ = tracing_subscriber::fmt::try_init();

    let chassis = FakeChassis::spawn(&[2]).await;
    let mut session = connect(&chassis, "alice").await;
    let sent = chassis.commands().len();

    let good = chassis.location(0, 0);
    for bad in ["0/0", "10.9.9.9/0/0", "nonsense"] {
        let err = session.reserve_ports(&[good.as_str(), bad], false).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "{bad}: {err:?}");
    }

    assert_eq!(chassis.commands().len(), sent);
}

#[tokio::test]
async fn disconnect_releases_ports() {
    let _ = tracing_subscriber::fmt::try_init();

    let chassis = FakeChassis::spawn(&[2]).await;
    let mut session = connect(&chassis, "alice").await;

    let locations = [chassis.location(0, 0), chassis.location(0, 1)];
    let locations = locations.iter().map(String::as_str).collect::<Vec<_>>();
    let ports = session.reserve_ports(&locations, false).await.unwrap();
    assert_eq!(ports.len(), 2);
    assert_eq!(chassis.state.lock().port(0, 0).reserved_by, "alice");

    session.disconnect().await.unwrap();
    assert!(chassis.state.lock().port(0, 0).reserved_by.is_empty());
    assert!(chassis.state.lock().port(0, 1).reserved_by.is_empty());
    assert!(session.chassis_list().is_empty());
    assert!(session.tree().is_empty());
    assert!(!session.tree().contains(ports[0]));

    let sent = chassis.commands().len();
    session.disconnect().await.unwrap();
    assert_eq!(chassis.commands().len(), sent);
}

#[tokio::test]
async fn ports_of_other_owners_stay_reserved() {
    let _ = tracing_subscriber::fmt::try_init();

    let chassis = FakeChassis::spawn(&[2]).await;
    chassis.state.lock().port(0, 1).reserved_by = "bob".to_string();

    let mut session = connect(&chassis, "alice").await;
    session.inventory().await.unwrap();
    session.reserve_ports(&[chassis.location(0, 0).as_str()], false).await.unwrap();

    session.disconnect().await.unwrap();
    assert!(chassis.state.lock().port(0, 0).reserved_by.is_empty());
    assert_eq!(chassis.state.lock().port(0, 1).reserved_by, "bob");
}

#[tokio::test]
async fn wait_for_states_caches_the_last_value() {
    let _ = tracing_subscriber::fmt::try_init();

    let chassis = FakeChassis::spawn(&[1]).await;
    let mut session = connect(&chassis, "alice").await;
    let port = session.reserve_ports(&[chassis.location(0, 0).as_str()], false).await.unwrap()[0];

    session.wait_for_up(port, Duration::from_secs(1)).await.unwrap();
    assert_eq!(session.node(port).unwrap().cached("p_receivesync"), Some("IN_SYNC"));

    let err = session
        .wait_for_states(port, "p_traffic", Duration::from_millis(100), &["ON"])
        .await
        .unwrap_err();
    assert!(err.is_state_timeout(), "{err:?}");
    assert_eq!(session.node(port).unwrap().cached("p_traffic"), Some("OFF"));
}

#[tokio::test]
async fn commands_through_the_session_root_are_rejected() {
    let chassis = FakeChassis::spawn(&[1]).await;
    let session = connect(&chassis, "alice").await;

    let err = session.send_command(session.root(), "c_comment", &["\"x\""]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn unprintable_text_is_rejected_before_sending() {
    let _ = tracing_subscriber::fmt::try_init();

    let chassis = FakeChassis::spawn(&[1]).await;
    let mut session: Session = Session::default();

    let err = session.add_chassis(&chassis.addr, "al\nice", PASSWORD).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "{err:?}");
    let err = session.add_chassis(&chassis.addr, "alice", "xe\rna").await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "{err:?}");
    assert!(session.chassis_list().is_empty());
    assert!(chassis.commands().is_empty());

    session.add_chassis(&chassis.addr, "alice", PASSWORD).await.unwrap();
    let location = chassis.location(0, 0);
    let port = session.reserve_ports(&[location.as_str()], false).await.unwrap()[0];
    let sent = chassis.commands().len();

    let err = session.send_command(port, "p_comment", &["\"a\nb\""]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "{err:?}");

    let err = session
        .set_attributes(port, [("p_comment", "\"ok\""), ("p_comment", "\"caf\u{e9}\"")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "{err:?}");
    assert_eq!(chassis.commands().len(), sent);

    // the connection is still in step
    assert_eq!(session.reservation(port).await.unwrap(), Reservation::ReservedByYou);
    assert!(!session.connection(port).unwrap().is_closed());
}

#[tokio::test]
async fn multi_line_reply_keeps_the_connection_in_step() {
    let _ = tracing_subscriber::fmt::try_init();

    let chassis = FakeChassis::spawn(&[1]).await;
    let mut session = connect(&chassis, "alice").await;
    let location = chassis.location(0, 0);
    let port = session.reserve_ports(&[location.as_str()], false).await.unwrap()[0];

    // p_info answers with several lines
    let err = session.get_attribute(port, "p_info").await.unwrap_err();
    assert!(
        matches!(err, Error::Socket(xena_socket::Error::UnexpectedReply { .. })),
        "{err:?}"
    );

    assert_eq!(session.reservation(port).await.unwrap(), Reservation::ReservedByYou);
    assert_eq!(session.reserved_by(port).await.unwrap(), "alice");
    assert!(!session.connection(port).unwrap().is_closed());
}
