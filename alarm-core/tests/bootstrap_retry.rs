use core::net::Ipv4Addr;
use core::time::Duration;

use alarm_core::bootstrap::{
    BootstrapController, BootstrapEvent, BootstrapState, FailReason, Lease, LeaseClient,
    LeaseResult,
};
use alarm_core::config::{AddressingMode, DHCP_RETRY_LIMIT, NetConfig, STATIC_NET_CONFIG};
use heapless::{Deque, Vec as HeaplessVec};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Call {
    Start,
    Step,
    Apply(Lease),
    Stop,
}

/// Replays scripted results; reports `Pending` once the script runs dry.
struct ScriptedClient {
    script: Deque<LeaseResult, 16>,
    calls: HeaplessVec<Call, 32>,
}

impl ScriptedClient {
    fn new(results: &[LeaseResult]) -> Self {
        let mut script = Deque::new();
        for result in results {
            script.push_back(*result).expect("script fits");
        }
        Self {
            script,
            calls: HeaplessVec::new(),
        }
    }

    fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|seen| **seen == call).count()
    }
}

impl LeaseClient for ScriptedClient {
    fn start(&mut self) {
        self.calls.push(Call::Start).expect("call log fits");
    }

    fn step(&mut self, _now: Duration) -> LeaseResult {
        self.calls.push(Call::Step).expect("call log fits");
        self.script.pop_front().unwrap_or(LeaseResult::Pending)
    }

    fn apply(&mut self, lease: &Lease) {
        self.calls.push(Call::Apply(*lease)).expect("call log fits");
    }

    fn stop(&mut self) {
        self.calls.push(Call::Stop).expect("call log fits");
    }
}

fn lease(last_octet: u8) -> Lease {
    Lease {
        config: NetConfig::new(
            Ipv4Addr::new(10, 0, 0, last_octet),
            Ipv4Addr::new(255, 255, 255, 0),
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 1),
        ),
        lease_time: Duration::from_secs(86_400),
    }
}

fn dhcp(results: &[LeaseResult]) -> BootstrapController<ScriptedClient> {
    BootstrapController::new(
        AddressingMode::Dhcp,
        ScriptedClient::new(results),
        DHCP_RETRY_LIMIT,
    )
}

fn now() -> Duration {
    Duration::from_millis(0)
}

#[test]
fn first_step_starts_the_client() {
    let mut controller = dhcp(&[]);
    assert_eq!(controller.state(), BootstrapState::Idle);

    let report = controller.step(now());
    assert_eq!(report.state, BootstrapState::Acquiring);
    assert_eq!(report.event, Some(BootstrapEvent::Started));
    assert_eq!(controller.client().calls.as_slice(), &[Call::Start]);

    let report = controller.step(now());
    assert_eq!(report.state, BootstrapState::Acquiring);
    assert_eq!(report.event, None);
}

#[test]
fn sixth_consecutive_timeout_fails_with_limit_five() {
    let mut controller = dhcp(&[LeaseResult::Timeout; 6]);
    controller.step(now());

    for attempt in 1..=5 {
        let report = controller.step(now());
        assert_eq!(report.state, BootstrapState::Retrying(attempt));
        assert_eq!(
            report.event,
            Some(BootstrapEvent::Timeout {
                attempt,
                limit: DHCP_RETRY_LIMIT,
            })
        );
        assert_eq!(controller.client().count(Call::Stop), 0, "attempt {attempt}");
    }

    let report = controller.step(now());
    let reason = FailReason::RetryLimitExceeded { attempts: 6 };
    assert_eq!(report.state, BootstrapState::Failed(reason));
    assert_eq!(report.event, Some(BootstrapEvent::Failed(reason)));
    assert_eq!(controller.client().count(Call::Stop), 1);
}

#[test]
fn failed_is_terminal() {
    let mut controller = dhcp(&[
        LeaseResult::Conflict,
        LeaseResult::Leased(lease(9)),
    ]);
    controller.step(now());
    controller.step(now());
    assert!(controller.state().is_terminal());

    let steps_before = controller.client().count(Call::Step);
    let report = controller.step(now());
    assert_eq!(
        report.state,
        BootstrapState::Failed(FailReason::AddressConflict)
    );
    assert_eq!(report.event, None);
    assert_eq!(controller.client().count(Call::Step), steps_before);
}

#[test]
fn lease_after_retries_applies_configuration() {
    let granted = lease(42);
    let mut controller = dhcp(&[
        LeaseResult::Timeout,
        LeaseResult::Timeout,
        LeaseResult::Pending,
        LeaseResult::Leased(granted),
    ]);

    let states: HeaplessVec<BootstrapState, 8> =
        (0..5).map(|_| controller.step(now()).state).collect();
    assert_eq!(
        states.as_slice(),
        &[
            BootstrapState::Acquiring,
            BootstrapState::Retrying(1),
            BootstrapState::Retrying(2),
            BootstrapState::Retrying(2),
            BootstrapState::Leased,
        ]
    );
    assert_eq!(controller.client().count(Call::Apply(granted)), 1);
    assert_eq!(controller.client().count(Call::Stop), 0);
}

#[test]
fn conflict_while_leased_fail_stops() {
    let mut controller = dhcp(&[LeaseResult::Leased(lease(7)), LeaseResult::Conflict]);
    controller.step(now());
    assert_eq!(controller.step(now()).state, BootstrapState::Leased);

    let report = controller.step(now());
    assert_eq!(
        report.state,
        BootstrapState::Failed(FailReason::AddressConflict)
    );
    assert_eq!(controller.client().count(Call::Stop), 1);
}

#[test]
fn renewal_reapplies_and_lost_lease_restarts_the_count() {
    let renewed = lease(8);
    let mut controller = dhcp(&[
        LeaseResult::Timeout,
        LeaseResult::Timeout,
        LeaseResult::Leased(lease(7)),
        LeaseResult::Renewed(renewed),
        LeaseResult::Timeout,
    ]);
    for _ in 0..4 {
        controller.step(now());
    }

    let report = controller.step(now());
    assert_eq!(report.state, BootstrapState::Leased);
    assert_eq!(report.event, Some(BootstrapEvent::Renewed(renewed)));
    assert_eq!(controller.client().count(Call::Apply(renewed)), 1);

    let report = controller.step(now());
    assert_eq!(report.state, BootstrapState::Retrying(1));
    assert_eq!(report.event, Some(BootstrapEvent::LeaseLost));
}

#[test]
fn static_addressing_bypasses_the_client() {
    let mut controller = BootstrapController::new(
        AddressingMode::Static(STATIC_NET_CONFIG),
        ScriptedClient::new(&[LeaseResult::Conflict]),
        DHCP_RETRY_LIMIT,
    );

    for _ in 0..3 {
        let report = controller.step(now());
        assert_eq!(report.state, BootstrapState::Leased);
        assert_eq!(report.event, None);
    }
    assert!(controller.client().calls.is_empty());
    assert_eq!(controller.static_config(), Some(STATIC_NET_CONFIG));
}

#[test]
fn zero_retry_limit_fails_on_first_timeout() {
    let mut controller =
        BootstrapController::new(AddressingMode::Dhcp, ScriptedClient::new(&[LeaseResult::Timeout]), 0);
    controller.step(now());

    assert_eq!(
        controller.step(now()).state,
        BootstrapState::Failed(FailReason::RetryLimitExceeded { attempts: 1 })
    );
}
