/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use simple_email::{BodyType, Email, EmailClient};

#[tokio::main]
async fn main() {
    env_logger::init();

    // Connect to the SMTP submissions port over implicit TLS and
    // authenticate using the provided credentials.
    let client = EmailClient::new(
        std::env::var("SMTP_LOGIN").unwrap(),
        std::env::var("SMTP_PASSWORD").unwrap(),
        "smtp.gmail.com",
        465,
    )
    .implicit_tls(true);

    let email = Email::new(
        format!("John Doe <{}>", client.login()),
        vec!["jane@example.com", "james@test.com"],
        "Hi!",
        "<h1>Hello, world!</h1>",
    )
    .body_type(BodyType::Html);

    client.send_async(&email).await.unwrap();
}
