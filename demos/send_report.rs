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

use simple_email::{Email, EmailClient};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Never hard-code credentials, read them at the edge of the program.
    let client = EmailClient::new(
        std::env::var("SMTP_LOGIN")?,
        std::env::var("SMTP_PASSWORD")?,
        std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.office365.com".to_string()),
        std::env::var("SMTP_PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(587),
    );

    let mut email = Email::new(
        client.login(),
        "an_email_address@domain.com",
        "Sample Subject Line",
        "Here's the body of the e-mail.",
    )
    .with_cc("another_email_address@domain.com");

    email.add_attachment(b"Test bytes".to_vec(), "test_file.csv");
    if let Some(path) = std::env::args().nth(1) {
        email.add_attachment_from_path(path)?;
    }

    client.send(&email)?;

    Ok(())
}
