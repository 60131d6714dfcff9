use std::sync::Arc;

use fastbin_rpc::{
    ClientInvoker, Dispatcher, FastbinConfig, Method, MsgPackSerialization, RemoteError, Result, ServerInvoker,
    ServiceInterface,
};

struct Greeter {
    greeting: String,
}

const HELLO: Method<(String,), String> = Method::new("hello");
const DIVIDE: Method<(i64, i64), i64> = Method::new("divide");

fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt::init();

    let dispatcher = Dispatcher::new(4)?;
    let config = FastbinConfig::loopback(0);

    let server = ServerInvoker::with_config(dispatcher.clone(), &config, MsgPackSerialization::default());
    server.start()?;

    let interface = ServiceInterface::new("Greeter")
        .method(HELLO, |svc: &Greeter, (name,): (String,)| {
            Ok(format!("{} {name}!", svc.greeting))
        })
        .method(DIVIDE, |_: &Greeter, (a, b): (i64, i64)| {
            a.checked_div(b)
                .ok_or_else(|| RemoteError::new("ArithmeticError", "division by zero"))
        });
    server.register_service(
        "greeter",
        Arc::new(Greeter {
            greeting: "Hello".to_string(),
        }),
        interface,
    )?;

    let client = ClientInvoker::with_config(dispatcher, &config, MsgPackSerialization::default());
    client.start()?;

    let greeter = client.get_proxy(&server.connect_address(), "greeter", 1)?;

    match greeter.invoke(&HELLO, ("Fabric".to_string(),))? {
        Ok(greeting) => println!("{greeting}"),
        Err(err) => println!("hello failed: {err}"),
    }

    match greeter.invoke(&DIVIDE, (7, 0))? {
        Ok(quotient) => println!("7 / 0 = {quotient}"),
        Err(err) => println!("7 / 0 failed: {err}"),
    }

    client.stop();
    server.stop();
    Ok(())
}
