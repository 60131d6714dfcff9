use std::collections::HashMap;
use std::sync::Arc;

use fastbin_rpc::{
    EndpointDescription, FastbinConfig, FastbinProvider, Method, MsgPackSerialization, RemoteError, Result,
    ServiceInterface,
};

struct Counter {
    step: u64,
}

const NEXT: Method<(u64,), u64> = Method::new("next");

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt::init();

    let provider = FastbinProvider::<MsgPackSerialization>::new(FastbinConfig::loopback(0))?;

    let interface = ServiceInterface::new("Counter")
        .method(NEXT, |svc: &Counter, (n,): (u64,)| Ok::<_, RemoteError>(n + svc.step));
    let properties = HashMap::from([("fastbin.endpoint.address".to_string(), "counter".to_string())]);
    let registration = provider.export(interface, Arc::new(Counter { step: 10 }), &properties)?;

    // Normally carried to another process by a discovery layer
    let advertised = registration.endpoint().to_properties();
    let endpoint = EndpointDescription::from_properties(&advertised)?;
    let counter = provider.import(&endpoint)?;

    let mut value = 0;
    for _ in 0..3 {
        value = counter.call(&NEXT, (value,)).await?.unwrap_or_default();
        println!("counter: {value}");
    }

    counter.invoke_async(&NEXT, (value,), |outcome| match outcome {
        Ok(Ok(next)) => println!("callback: {next}"),
        Ok(Err(err)) => println!("callback: service error {err}"),
        Err(err) => println!("callback: transport error {err}"),
    });

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    registration.close();
    provider.shutdown();
    Ok(())
}
